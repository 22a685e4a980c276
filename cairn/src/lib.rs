pub mod assets;
pub mod error;
pub mod filter;
pub mod registry;
pub mod schema;
pub mod store;
pub mod translate;
pub mod util;
pub mod validation;
pub mod watcher;

pub use assets::{Asset, AssetInfo, ImageProcessor, ListAssetsOptions, TransformOptions, UploadOptions};
pub use error::{CairnError, Result};
pub use filter::{does_match_filter, Filter};
pub use registry::{Collection, CollectionRef, Global, GlobalRef, Registry, RegistrySnapshot};
pub use schema::SchemaDefinition;
pub use store::{ContentStore, EntryList, ListOptions, SortDirection};
pub use watcher::{ContentEvent, ContentWatcher};
