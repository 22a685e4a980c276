use crate::error::{CairnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level schema definition parsed from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub collections: BTreeMap<String, ObjectSchema>,
    #[serde(default)]
    pub globals: BTreeMap<String, ObjectSchema>,
}

/// Field layout of a collection entry, a global value, or a nested object field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    /// Keep keys that are not declared in `fields`. When false they are stripped on write.
    #[serde(default)]
    pub additional_properties: bool,
    /// Reject undeclared keys instead of stripping them.
    #[serde(default)]
    pub strict: bool,
}

/// Definition of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Target collection of a reference field
    #[serde(default)]
    pub collection: Option<String>,
    /// Item definition of a list field
    #[serde(default)]
    pub items: Option<Box<FieldDefinition>>,
    /// Nested fields of an object field
    #[serde(default)]
    pub fields: Option<BTreeMap<String, FieldDefinition>>,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    List,
    Object,
    #[serde(alias = "ref")]
    Reference,
    Json,
}

impl SchemaDefinition {
    /// Check that every reference field names a declared collection.
    pub fn check(&self) -> Result<()> {
        let declared = |name: &str| self.collections.contains_key(name);
        for (name, schema) in &self.collections {
            schema.check_references(name, &declared)?;
        }
        for (name, schema) in &self.globals {
            schema.check_references(name, &declared)?;
        }
        Ok(())
    }
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, definition: FieldDefinition) -> Self {
        self.fields.insert(name.to_string(), definition);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn check_references(&self, owner: &str, declared: &dyn Fn(&str) -> bool) -> Result<()> {
        for (field_name, field) in &self.fields {
            field.check_references(&format!("{owner}.{field_name}"), declared)?;
        }
        Ok(())
    }
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            nullable: false,
            enum_values: None,
            default: None,
            collection: None,
            items: None,
            fields: None,
        }
    }

    pub fn reference(collection: &str) -> Self {
        FieldDefinition {
            collection: Some(collection.to_string()),
            ..Self::new(FieldType::Reference)
        }
    }

    pub fn list(items: FieldDefinition) -> Self {
        FieldDefinition {
            items: Some(Box::new(items)),
            ..Self::new(FieldType::List)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    fn check_references(&self, path: &str, declared: &dyn Fn(&str) -> bool) -> Result<()> {
        if self.field_type == FieldType::Reference {
            match &self.collection {
                None => {
                    return Err(CairnError::Schema(format!(
                        "Reference field '{path}' has no target collection"
                    )))
                }
                Some(target) if !declared(target) => {
                    return Err(CairnError::Schema(format!(
                        "Reference field '{path}' targets undeclared collection '{target}'"
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(items) = &self.items {
            items.check_references(&format!("{path}[]"), declared)?;
        }
        if let Some(fields) = &self.fields {
            for (name, field) in fields {
                field.check_references(&format!("{path}.{name}"), declared)?;
            }
        }
        Ok(())
    }
}
