use super::{ensure_safe_name, read_envelope, remove_file_if_exists, write_envelope, ContentStore};
use crate::error::{CairnError, Result};
use crate::registry::{Collection, CollectionRef};
use crate::translate;
use crate::util::is_safe_name;
use crate::validation;
use serde_json::{Map, Value};

impl ContentStore {
    /// Get an entry by id. A missing or unreadable file is `Ok(None)`; only an
    /// undeclared collection is an error.
    ///
    /// Fields named in `include` that hold references (or lists of references)
    /// get the referenced entry attached as `entry`, one level deep.
    pub fn get_entry(
        &self,
        collection: impl Into<CollectionRef>,
        id: &str,
        include: &[&str],
    ) -> Result<Option<Value>> {
        let collection = self.registry.resolve_collection(collection)?;
        let Some(mut entry) = self.load_entry(&collection, id) else {
            return Ok(None);
        };
        self.resolve_references(&mut entry, include);
        Ok(Some(entry))
    }

    /// Read an entry, reporting why it could not be read. `EntryNotFound` for a
    /// missing file; `Io`/`Json` for anything else.
    pub fn read_entry(&self, collection: impl Into<CollectionRef>, id: &str) -> Result<Value> {
        let collection = self.registry.resolve_collection(collection)?;
        self.read_entry_file(&collection, id)
    }

    /// Validate `data` against the collection schema and write it, replacing any
    /// existing entry with this id. Returns the stored (coerced) value.
    pub fn set_entry(
        &self,
        collection: impl Into<CollectionRef>,
        id: &str,
        data: Value,
    ) -> Result<Value> {
        let collection = self.registry.resolve_collection(collection)?;
        ensure_safe_name(id)?;

        // Translated on every write so newly registered collections are reflected
        let snapshot = self.registry.snapshot();
        let shape = translate::convert_schema(collection.schema(), snapshot.collection_schemas());

        let mut data = data;
        validation::validate_and_prepare(&shape, &mut data)?;

        write_envelope(&self.entry_path(collection.name(), id), &data)?;
        log::debug!("Wrote entry {}/{}", collection.name(), id);
        Ok(data)
    }

    /// Delete an entry. Returns false if there was nothing to delete.
    pub fn delete_entry(&self, collection: impl Into<CollectionRef>, id: &str) -> Result<bool> {
        let collection = self.registry.resolve_collection(collection)?;
        if !is_safe_name(id) {
            return Ok(false);
        }
        let removed = remove_file_if_exists(&self.entry_path(collection.name(), id))?;
        if removed {
            log::debug!("Deleted entry {}/{}", collection.name(), id);
        }
        Ok(removed)
    }

    fn read_entry_file(&self, collection: &Collection, id: &str) -> Result<Value> {
        let not_found = || CairnError::EntryNotFound {
            collection: collection.name().to_string(),
            id: id.to_string(),
        };
        if !is_safe_name(id) {
            return Err(not_found());
        }
        read_envelope(&self.entry_path(collection.name(), id)).map_err(|e| {
            if e.is_not_found() {
                not_found()
            } else {
                e
            }
        })
    }

    fn load_entry(&self, collection: &Collection, id: &str) -> Option<Value> {
        match self.read_entry_file(collection, id) {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::debug!("Entry {}/{} unavailable: {e}", collection.name(), id);
                None
            }
        }
    }

    /// Attach referenced entries for the named fields. Reads run one at a time.
    pub(crate) fn resolve_references(&self, entry: &mut Value, include: &[&str]) {
        let Some(fields) = entry.as_object_mut() else {
            return;
        };
        for field in include {
            match fields.get_mut(*field) {
                Some(Value::Object(reference)) => self.attach_referenced_entry(reference),
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::Object(reference) = item {
                            self.attach_referenced_entry(reference);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn attach_referenced_entry(&self, reference: &mut Map<String, Value>) {
        let (Some(id), Some(target)) = (
            reference.get("id").and_then(Value::as_str),
            reference.get("collection").and_then(Value::as_str),
        ) else {
            return;
        };

        let Some(collection) = self.registry.snapshot().collection(target).cloned() else {
            log::warn!("Reference to undeclared collection '{target}' left unresolved");
            return;
        };
        let resolved = self.load_entry(&collection, id).unwrap_or(Value::Null);
        reference.insert("entry".to_string(), resolved);
    }
}
