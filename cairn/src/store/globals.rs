use super::{read_envelope, write_envelope, ContentStore};
use crate::error::{CairnError, Result};
use crate::registry::{Global, GlobalRef};
use crate::translate;
use crate::validation;
use serde_json::Value;

impl ContentStore {
    /// Get the stored value of a global. A missing or unreadable file is `Ok(None)`.
    pub fn get_global_value(&self, global: impl Into<GlobalRef>) -> Result<Option<Value>> {
        let global = self.registry.resolve_global(global)?;
        match self.read_global_file(&global) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::debug!("Global {} unavailable: {e}", global.name());
                Ok(None)
            }
        }
    }

    /// Read a global value, reporting why it could not be read.
    pub fn read_global_value(&self, global: impl Into<GlobalRef>) -> Result<Value> {
        let global = self.registry.resolve_global(global)?;
        self.read_global_file(&global)
    }

    /// Validate and store the value of a global. Returns the stored (coerced) value.
    pub fn set_global_value(&self, global: impl Into<GlobalRef>, data: Value) -> Result<Value> {
        let global = self.registry.resolve_global(global)?;
        let shape = translate::convert_schema_shallow(global.schema());

        let mut data = data;
        validation::validate_and_prepare(&shape, &mut data)?;

        write_envelope(&self.global_path(global.name()), &data)?;
        log::debug!("Wrote global {}", global.name());
        Ok(data)
    }

    fn read_global_file(&self, global: &Global) -> Result<Value> {
        read_envelope(&self.global_path(global.name())).map_err(|e| {
            if e.is_not_found() {
                CairnError::GlobalValueNotFound(global.name().to_string())
            } else {
                e
            }
        })
    }
}
