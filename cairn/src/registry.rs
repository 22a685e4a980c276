use crate::error::{CairnError, Result};
use crate::schema::{ObjectSchema, SchemaDefinition};
use crate::util::is_safe_name;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Directory names under the content root that collections may not use.
pub const RESERVED_NAMES: &[&str] = &["globals", "assets"];

/// A resolved handle to a declared collection. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    name: String,
    schema: Arc<ObjectSchema>,
}

/// A resolved handle to a declared global. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    name: String,
    schema: Arc<ObjectSchema>,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }
}

impl Global {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }
}

/// Either a collection name still to be looked up, or an already resolved handle.
#[derive(Debug, Clone)]
pub enum CollectionRef {
    Named(String),
    Resolved(Collection),
}

/// Either a global name still to be looked up, or an already resolved handle.
#[derive(Debug, Clone)]
pub enum GlobalRef {
    Named(String),
    Resolved(Global),
}

impl From<&str> for CollectionRef {
    fn from(name: &str) -> Self {
        CollectionRef::Named(name.to_string())
    }
}

impl From<String> for CollectionRef {
    fn from(name: String) -> Self {
        CollectionRef::Named(name)
    }
}

impl From<Collection> for CollectionRef {
    fn from(handle: Collection) -> Self {
        CollectionRef::Resolved(handle)
    }
}

impl From<&Collection> for CollectionRef {
    fn from(handle: &Collection) -> Self {
        CollectionRef::Resolved(handle.clone())
    }
}

impl From<&str> for GlobalRef {
    fn from(name: &str) -> Self {
        GlobalRef::Named(name.to_string())
    }
}

impl From<String> for GlobalRef {
    fn from(name: String) -> Self {
        GlobalRef::Named(name)
    }
}

impl From<Global> for GlobalRef {
    fn from(handle: Global) -> Self {
        GlobalRef::Resolved(handle)
    }
}

impl From<&Global> for GlobalRef {
    fn from(handle: &Global) -> Self {
        GlobalRef::Resolved(handle.clone())
    }
}

/// An immutable view of every declared collection and global.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    definition: SchemaDefinition,
    collections: BTreeMap<String, Collection>,
    globals: BTreeMap<String, Global>,
}

impl RegistrySnapshot {
    /// Build a snapshot from a parsed schema definition. Fails if a name cannot be
    /// used on disk or a reference targets an undeclared collection.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self> {
        definition.check()?;

        let mut collections = BTreeMap::new();
        for (name, schema) in &definition.collections {
            if !is_safe_name(name) || RESERVED_NAMES.contains(&name.as_str()) {
                return Err(CairnError::Schema(format!(
                    "'{name}' cannot be used as a collection name"
                )));
            }
            let handle = Collection {
                name: name.clone(),
                schema: Arc::new(schema.clone()),
            };
            collections.insert(name.clone(), handle);
        }

        let mut globals = BTreeMap::new();
        for (name, schema) in &definition.globals {
            if !is_safe_name(name) {
                return Err(CairnError::Schema(format!(
                    "'{name}' cannot be used as a global name"
                )));
            }
            let handle = Global {
                name: name.clone(),
                schema: Arc::new(schema.clone()),
            };
            globals.insert(name.clone(), handle);
        }

        Ok(RegistrySnapshot {
            definition,
            collections,
            globals,
        })
    }

    /// Build a snapshot from in-code declarations.
    pub fn new<C, G>(collections: C, globals: G) -> Result<Self>
    where
        C: IntoIterator<Item = (String, ObjectSchema)>,
        G: IntoIterator<Item = (String, ObjectSchema)>,
    {
        Self::from_definition(SchemaDefinition {
            collections: collections.into_iter().collect(),
            globals: globals.into_iter().collect(),
        })
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.values()
    }

    pub fn globals(&self) -> impl Iterator<Item = &Global> {
        self.globals.values()
    }

    /// Every collection schema by name, as consumed by the schema translator.
    pub fn collection_schemas(&self) -> &BTreeMap<String, ObjectSchema> {
        &self.definition.collections
    }
}

/// Process-scoped registry of collections and globals. Reconfiguring swaps the
/// whole snapshot; readers hold an `Arc` to whichever snapshot was active.
#[derive(Debug, Default)]
pub struct Registry {
    active: RwLock<Arc<RegistrySnapshot>>,
}

impl Registry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Registry {
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replace every declaration at once.
    pub fn configure(&self, snapshot: RegistrySnapshot) {
        log::info!(
            "Registry configured: {} collections, {} globals",
            snapshot.collections.len(),
            snapshot.globals.len()
        );
        let next = Arc::new(snapshot);
        match self.active.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// The currently active snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.active.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn resolve_collection(&self, reference: impl Into<CollectionRef>) -> Result<Collection> {
        match reference.into() {
            CollectionRef::Resolved(handle) => Ok(handle),
            CollectionRef::Named(name) => self
                .snapshot()
                .collection(&name)
                .cloned()
                .ok_or(CairnError::CollectionNotFound(name)),
        }
    }

    pub fn resolve_global(&self, reference: impl Into<GlobalRef>) -> Result<Global> {
        match reference.into() {
            GlobalRef::Resolved(handle) => Ok(handle),
            GlobalRef::Named(name) => self
                .snapshot()
                .global(&name)
                .cloned()
                .ok_or(CairnError::GlobalNotFound(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};

    fn posts_schema() -> ObjectSchema {
        ObjectSchema::new().field("title", FieldDefinition::new(FieldType::String).required())
    }

    fn registry() -> Registry {
        Registry::new(
            RegistrySnapshot::new(
                [("posts".to_string(), posts_schema())],
                [("settings".to_string(), ObjectSchema::new())],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_resolve_by_name() {
        let registry = registry();
        let posts = registry.resolve_collection("posts").unwrap();
        assert_eq!(posts.name(), "posts");
        assert!(posts.schema().fields["title"].required);

        let settings = registry.resolve_global("settings").unwrap();
        assert_eq!(settings.name(), "settings");
    }

    #[test]
    fn test_resolve_unknown_name() {
        let registry = registry();
        assert!(matches!(
            registry.resolve_collection("pages"),
            Err(CairnError::CollectionNotFound(name)) if name == "pages"
        ));
        assert!(matches!(
            registry.resolve_global("footer"),
            Err(CairnError::GlobalNotFound(name)) if name == "footer"
        ));
    }

    #[test]
    fn test_resolved_handle_passes_through() {
        let registry = registry();
        let posts = registry.resolve_collection("posts").unwrap();

        // Still usable after the declaration disappears from the registry
        registry.configure(RegistrySnapshot::default());
        assert!(registry.resolve_collection("posts").is_err());
        assert_eq!(registry.resolve_collection(&posts).unwrap(), posts);
    }

    #[test]
    fn test_configure_replaces_everything() {
        let registry = registry();
        let before = registry.snapshot();

        registry.configure(
            RegistrySnapshot::new([("pages".to_string(), ObjectSchema::new())], []).unwrap(),
        );

        assert!(registry.resolve_collection("pages").is_ok());
        assert!(registry.resolve_collection("posts").is_err());
        assert!(registry.resolve_global("settings").is_err());
        // Readers holding the previous snapshot keep a consistent view
        assert!(before.collection("posts").is_some());
        assert!(before.collection("pages").is_none());
    }

    #[test]
    fn test_reserved_and_unsafe_names_rejected() {
        assert!(RegistrySnapshot::new([("assets".to_string(), ObjectSchema::new())], []).is_err());
        assert!(RegistrySnapshot::new([("a/b".to_string(), ObjectSchema::new())], []).is_err());
        assert!(RegistrySnapshot::new([], [("../x".to_string(), ObjectSchema::new())]).is_err());
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let schema = ObjectSchema::new().field("author", FieldDefinition::reference("authors"));
        let err = RegistrySnapshot::new([("posts".to_string(), schema)], []).unwrap_err();
        assert!(matches!(err, CairnError::Schema(_)));
    }
}
