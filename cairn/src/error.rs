use thiserror::Error;

#[derive(Error, Debug)]
pub enum CairnError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Global not found: {0}")]
    GlobalNotFound(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Entry not found: {collection}/{id}")]
    EntryNotFound { collection: String, id: String },

    #[error("Global value not found: {0}")]
    GlobalValueNotFound(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl CairnError {
    /// Content absence as opposed to a failure to read it.
    pub fn is_not_found(&self) -> bool {
        match self {
            CairnError::EntryNotFound { .. }
            | CairnError::GlobalValueNotFound(_)
            | CairnError::AssetNotFound(_) => true,
            CairnError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CairnError>;
