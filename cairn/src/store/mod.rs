mod entries;
mod globals;
mod query;

pub use query::{EntryList, ListOptions, SortDirection, DEFAULT_LIMIT};

use crate::assets::ImageProcessor;
use crate::error::{CairnError, Result};
use crate::registry::{Registry, RegistrySnapshot};
use crate::schema::parse_schema;
use crate::translate;
use crate::util::is_safe_name;
use crate::validation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the schema file looked up by [`ContentStore::open`].
pub const SCHEMA_FILE: &str = "schema.yaml";
pub(crate) const GLOBALS_DIR: &str = "globals";
pub(crate) const ASSETS_DIR: &str = "assets";

/// The main entry point: a content directory plus the registry of declared
/// collections and globals, and an optional image processor for asset derivatives.
pub struct ContentStore {
    root: PathBuf,
    registry: Registry,
    images: Option<Box<dyn ImageProcessor>>,
}

/// On-disk wrapper around every entry and global value.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    data: &'a Value,
}

#[derive(Deserialize)]
struct Envelope {
    data: Value,
}

impl ContentStore {
    /// Create a store over `root` with the given declarations. The directory is
    /// created lazily on first write.
    pub fn new(root: impl Into<PathBuf>, snapshot: RegistrySnapshot) -> Self {
        ContentStore {
            root: root.into(),
            registry: Registry::new(snapshot),
            images: crate::assets::default_image_processor(),
        }
    }

    /// Open an existing content directory. Declarations are loaded from
    /// `schema.yaml` in that directory when present; otherwise the registry
    /// starts empty and can be filled with [`ContentStore::configure`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CairnError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Content directory does not exist: {}", root.display()),
            )));
        }

        let schema_path = root.join(SCHEMA_FILE);
        let snapshot = if schema_path.exists() {
            RegistrySnapshot::from_definition(parse_schema(&schema_path)?)?
        } else {
            log::debug!("No {SCHEMA_FILE} in {}, starting empty", root.display());
            RegistrySnapshot::default()
        };

        Ok(Self::new(root, snapshot))
    }

    /// Replace the image processor; `None` disables derivative generation.
    pub fn with_image_processor(mut self, images: Option<Box<dyn ImageProcessor>>) -> Self {
        self.images = images;
        self
    }

    /// Atomically replace every collection and global declaration.
    pub fn configure(&self, snapshot: RegistrySnapshot) {
        self.registry.configure(snapshot);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the root content directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn image_processor(&self) -> Option<&dyn ImageProcessor> {
        self.images.as_deref()
    }

    pub(crate) fn entry_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    pub(crate) fn global_path(&self, name: &str) -> PathBuf {
        self.root.join(GLOBALS_DIR).join(format!("{name}.json"))
    }

    pub(crate) fn assets_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    /// Check every stored entry and global value against its current schema.
    /// Returns a report of the documents that fail.
    pub fn validate_all(&self) -> Result<Value> {
        let snapshot = self.registry.snapshot();

        let mut collections = serde_json::Map::new();
        for collection in snapshot.collections() {
            let shape = translate::convert_schema(collection.schema(), snapshot.collection_schemas());
            let mut total = 0;
            let mut issues = Vec::new();

            for (id, entry) in self.scan_collection(collection.name())? {
                total += 1;
                let errors = match entry {
                    Ok(data) => validation::validate(&shape, &data).errors,
                    Err(e) => vec![format!("Unreadable entry: {e}")],
                };
                if !errors.is_empty() {
                    issues.push(serde_json::json!({ "id": id, "errors": errors }));
                }
            }

            collections.insert(
                collection.name().to_string(),
                serde_json::json!({ "total": total, "issues": issues }),
            );
        }

        let mut globals = serde_json::Map::new();
        for global in snapshot.globals() {
            let path = self.global_path(global.name());
            let errors = match read_envelope(&path) {
                Ok(data) => {
                    let shape = translate::convert_schema_shallow(global.schema());
                    validation::validate(&shape, &data).errors
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => vec![format!("Unreadable value: {e}")],
            };
            globals.insert(
                global.name().to_string(),
                serde_json::json!({ "valid": errors.is_empty(), "errors": errors }),
            );
        }

        Ok(serde_json::json!({ "collections": collections, "globals": globals }))
    }
}

pub(crate) fn ensure_safe_name(name: &str) -> Result<()> {
    if is_safe_name(name) {
        Ok(())
    } else {
        Err(CairnError::InvalidName(name.to_string()))
    }
}

/// Read a `{ "data": ... }` file and unwrap it.
pub(crate) fn read_envelope(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let envelope: Envelope = serde_json::from_str(&content)?;
    Ok(envelope.data)
}

/// Write `{ "data": ... }` through a temp file in the same directory, so readers
/// never see a partially written document.
pub(crate) fn write_envelope(path: &Path, data: &Value) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        CairnError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("No parent directory for {}", path.display()),
        ))
    })?;
    std::fs::create_dir_all(dir)?;

    let json = serde_json::to_vec_pretty(&EnvelopeRef { data })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| CairnError::Io(e.error))?;
    Ok(())
}

/// Remove a file, reporting whether there was anything to remove.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_open_loads_schema_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SCHEMA_FILE), SCHEMA).unwrap();

        let store = ContentStore::open(tmp.path()).unwrap();
        assert!(store.registry().resolve_collection("posts").is_ok());
        assert!(store.registry().resolve_global("settings").is_ok());
    }

    #[test]
    fn test_open_without_schema_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(tmp.path()).unwrap();
        assert!(store.registry().resolve_collection("posts").is_err());
    }

    #[test]
    fn test_open_missing_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(ContentStore::open(tmp.path().join("nope")).is_err());
    }

    #[test]
    fn test_envelope_layout_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("doc.json");
        write_envelope(&path, &json!({ "a": 1 })).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({ "data": { "a": 1 } }));
        assert_eq!(read_envelope(&path).unwrap(), json!({ "a": 1 }));

        // Only the document itself is left in the directory
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_envelope_distinguishes_missing_from_corrupt() {
        let tmp = TempDir::new().unwrap();
        let missing = read_envelope(&tmp.path().join("missing.json")).unwrap_err();
        assert!(missing.is_not_found());

        let corrupt_path = tmp.path().join("corrupt.json");
        std::fs::write(&corrupt_path, "{ not json").unwrap();
        let corrupt = read_envelope(&corrupt_path).unwrap_err();
        assert!(matches!(corrupt, CairnError::Json(_)));
        assert!(!corrupt.is_not_found());

        let unwrapped_path = tmp.path().join("unwrapped.json");
        std::fs::write(&unwrapped_path, r#"{ "title": "no envelope" }"#).unwrap();
        assert!(read_envelope(&unwrapped_path).is_err());
    }

    #[test]
    fn test_validate_all_reports_bad_documents() {
        let (tmp, store) = setup_test_store();
        store
            .set_entry("posts", "good", json!({ "title": "Good" }))
            .unwrap();
        // Written behind the store's back
        write_envelope(&tmp.path().join("posts/bad.json"), &json!({ "status": "gone" })).unwrap();
        std::fs::write(tmp.path().join("posts/broken.json"), "nope").unwrap();
        write_envelope(&tmp.path().join("globals/settings.json"), &json!({})).unwrap();

        let report = store.validate_all().unwrap();
        assert_eq!(report["collections"]["posts"]["total"], json!(3));
        let issues = report["collections"]["posts"]["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0]["id"], json!("bad"));
        assert_eq!(issues[1]["id"], json!("broken"));
        assert_eq!(report["collections"]["authors"]["total"], json!(0));
        assert_eq!(report["globals"]["settings"]["valid"], json!(false));
    }
}
