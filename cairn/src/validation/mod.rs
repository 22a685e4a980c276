//! Structural validation over [`Shape`] trees.
//!
//! Shapes are produced from declarative schemas by [`crate::translate`]. This module
//! only knows about shapes: it coerces values (defaults, unknown-key stripping) and
//! reports every field-level problem it finds.

use crate::error::{CairnError, Result};
use crate::util::{is_safe_name, parse_iso_date, type_name};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A structural validator definition
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Any,
    String { values: Option<Vec<String>> },
    Number,
    Integer,
    Boolean,
    Date,
    List(Box<Shape>),
    Object(ObjectShape),
    /// A `{ id, collection }` pointer. When `entry` is present, a resolved `entry`
    /// attached to the reference is checked against it.
    Reference {
        collection: String,
        entry: Option<Box<ObjectShape>>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectShape {
    pub properties: BTreeMap<String, Property>,
    pub unknown_keys: UnknownKeys,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub shape: Shape,
    pub required: bool,
    pub nullable: bool,
    pub default: Option<Value>,
}

/// What happens to keys that an object shape does not declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    #[default]
    Strip,
    Keep,
    Reject,
}

/// Result of validating a document
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, message: String) {
        self.errors.push(message);
    }
}

/// Validate a document against an object shape, collecting every problem.
pub fn validate(shape: &ObjectShape, data: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    match data.as_object() {
        Some(map) => validate_object(shape, map, "", &mut result),
        None => result.push(format!(
            "Document data must be an object, got {}",
            type_name(data)
        )),
    }
    result
}

/// Apply defaults and strip undeclared keys in place, recursively.
pub fn coerce(shape: &ObjectShape, data: &mut Value) {
    let Some(map) = data.as_object_mut() else {
        return;
    };
    coerce_object(shape, map);
}

/// Coerce, then validate. Returns an error listing every problem if validation fails.
pub fn validate_and_prepare(shape: &ObjectShape, data: &mut Value) -> Result<()> {
    coerce(shape, data);
    let result = validate(shape, data);

    if !result.is_ok() {
        return Err(CairnError::Validation(format!(
            "Document validation failed:\n  - {}",
            result.errors.join("\n  - ")
        )));
    }
    Ok(())
}

fn coerce_object(shape: &ObjectShape, map: &mut Map<String, Value>) {
    for (name, property) in &shape.properties {
        let missing = map.get(name).map(Value::is_null).unwrap_or(true);
        if missing {
            if let Some(default) = &property.default {
                map.insert(name.clone(), default.clone());
            }
        }
        if let Some(value) = map.get_mut(name) {
            coerce_value(&property.shape, value);
        }
    }

    if shape.unknown_keys == UnknownKeys::Strip {
        map.retain(|key, _| shape.properties.contains_key(key));
    }
}

fn coerce_value(shape: &Shape, value: &mut Value) {
    match (shape, value) {
        (Shape::Object(inner), Value::Object(map)) => coerce_object(inner, map),
        (Shape::List(items), Value::Array(values)) => {
            for item in values {
                coerce_value(items, item);
            }
        }
        _ => {}
    }
}

fn validate_object(
    shape: &ObjectShape,
    map: &Map<String, Value>,
    prefix: &str,
    result: &mut ValidationResult,
) {
    for (name, property) in &shape.properties {
        let path = join_path(prefix, name);
        match map.get(name) {
            None => {
                if property.required {
                    result.push(format!("Required field '{path}' is missing"));
                }
            }
            Some(Value::Null) => {
                if property.nullable {
                    continue;
                }
                if property.required {
                    result.push(format!("Required field '{path}' is null"));
                } else {
                    result.push(format!("Field '{path}' is not nullable"));
                }
            }
            Some(value) => validate_value(&property.shape, value, &path, result),
        }
    }

    if shape.unknown_keys == UnknownKeys::Reject {
        for key in map.keys() {
            if !shape.properties.contains_key(key) {
                result.push(format!("Unexpected field '{}'", join_path(prefix, key)));
            }
        }
    }
}

fn validate_value(shape: &Shape, value: &Value, path: &str, result: &mut ValidationResult) {
    match shape {
        Shape::Any => {}
        Shape::String { values } => {
            let Some(s) = value.as_str() else {
                result.push(mismatch(path, "string", value));
                return;
            };
            if let Some(values) = values {
                if !values.iter().any(|v| v == s) {
                    result.push(format!(
                        "Field '{path}' value '{s}' is not in enum: {values:?}"
                    ));
                }
            }
        }
        Shape::Number => {
            if !value.is_number() {
                result.push(mismatch(path, "number", value));
            }
        }
        Shape::Integer => {
            let integral = value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false);
            if !integral {
                result.push(mismatch(path, "integer", value));
            }
        }
        Shape::Boolean => {
            if !value.is_boolean() {
                result.push(mismatch(path, "boolean", value));
            }
        }
        Shape::Date => match value.as_str() {
            Some(s) if parse_iso_date(s).is_some() => {}
            Some(s) => result.push(format!("Field '{path}' value '{s}' is not an ISO date")),
            None => result.push(mismatch(path, "date string", value)),
        },
        Shape::List(items) => {
            let Some(values) = value.as_array() else {
                result.push(mismatch(path, "list", value));
                return;
            };
            for (i, item) in values.iter().enumerate() {
                validate_value(items, item, &format!("{path}[{i}]"), result);
            }
        }
        Shape::Object(inner) => match value.as_object() {
            Some(map) => validate_object(inner, map, path, result),
            None => result.push(mismatch(path, "object", value)),
        },
        Shape::Reference { collection, entry } => {
            validate_reference(collection, entry.as_deref(), value, path, result)
        }
    }
}

fn validate_reference(
    collection: &str,
    entry: Option<&ObjectShape>,
    value: &Value,
    path: &str,
    result: &mut ValidationResult,
) {
    let Some(map) = value.as_object() else {
        result.push(format!(
            "Field '{path}' expected reference {{ id, collection }}, got {}",
            type_name(value)
        ));
        return;
    };

    match map.get("id").and_then(Value::as_str) {
        Some(id) if is_safe_name(id) => {}
        Some(id) => result.push(format!("Field '{path}.id' value '{id}' is not a valid id")),
        None => result.push(format!("Field '{path}.id' must be a string")),
    }

    match map.get("collection").and_then(Value::as_str) {
        Some(target) if target == collection => {}
        Some(target) => result.push(format!(
            "Field '{path}' must reference collection '{collection}', got '{target}'"
        )),
        None => result.push(format!("Field '{path}.collection' must be a string")),
    }

    if let (Some(shape), Some(resolved)) = (entry, map.get("entry")) {
        match resolved {
            Value::Null => {}
            Value::Object(resolved) => {
                validate_object(shape, resolved, &format!("{path}.entry"), result)
            }
            other => result.push(mismatch(&format!("{path}.entry"), "object", other)),
        }
    }
}

fn mismatch(path: &str, expected: &str, value: &Value) -> String {
    format!("Field '{path}' expected {expected}, got {}", type_name(value))
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn prop(shape: Shape) -> Property {
        Property {
            shape,
            required: false,
            nullable: false,
            default: None,
        }
    }

    fn required(shape: Shape) -> Property {
        Property {
            required: true,
            ..prop(shape)
        }
    }

    fn user_shape() -> ObjectShape {
        let mut properties = BTreeMap::new();
        properties.insert("name".into(), required(Shape::String { values: None }));
        properties.insert("email".into(), required(Shape::String { values: None }));
        properties.insert(
            "role".into(),
            Property {
                default: Some(json!("member")),
                ..prop(Shape::String {
                    values: Some(vec!["admin".into(), "member".into(), "guest".into()]),
                })
            },
        );
        properties.insert("age".into(), prop(Shape::Integer));
        properties.insert("joined".into(), prop(Shape::Date));
        properties.insert("tags".into(), prop(Shape::List(Box::new(Shape::String { values: None }))));
        ObjectShape {
            properties,
            unknown_keys: UnknownKeys::Strip,
        }
    }

    #[test]
    fn test_valid_user() {
        let result = validate(
            &user_shape(),
            &json!({ "name": "Alice", "email": "alice@test.com", "role": "admin" }),
        );
        assert!(result.is_ok(), "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_missing_required_field() {
        let result = validate(&user_shape(), &json!({ "name": "Alice" }));
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("email")));
    }

    #[test]
    fn test_invalid_enum_value() {
        let result = validate(
            &user_shape(),
            &json!({ "name": "Alice", "email": "a@test.com", "role": "superadmin" }),
        );
        assert!(result.errors.iter().any(|e| e.contains("superadmin")));
    }

    #[test]
    fn test_errors_are_aggregated() {
        let result = validate(
            &user_shape(),
            &json!({ "name": 42, "age": 1.5, "joined": "yesterday", "tags": ["ok", 3] }),
        );
        assert_eq!(
            result.errors,
            vec![
                "Field 'age' expected integer, got number".to_string(),
                "Required field 'email' is missing".to_string(),
                "Field 'joined' value 'yesterday' is not an ISO date".to_string(),
                "Field 'name' expected string, got number".to_string(),
                "Field 'tags[1]' expected string, got number".to_string(),
            ]
        );
    }

    #[test]
    fn test_coerce_applies_defaults_and_strips() {
        let mut data = json!({ "name": "Alice", "email": "a@test.com", "extra": true });
        coerce(&user_shape(), &mut data);
        assert_eq!(
            data,
            json!({ "name": "Alice", "email": "a@test.com", "role": "member" })
        );
    }

    #[test]
    fn test_coerce_doesnt_overwrite() {
        let mut data = json!({ "name": "Alice", "email": "a@test.com", "role": "admin" });
        coerce(&user_shape(), &mut data);
        assert_eq!(data["role"], json!("admin"));
    }

    #[test]
    fn test_strict_rejects_unknown_keys() {
        let shape = ObjectShape {
            unknown_keys: UnknownKeys::Reject,
            ..user_shape()
        };
        let mut data = json!({ "name": "Alice", "email": "a@test.com", "extra_field": 1 });
        let err = validate_and_prepare(&shape, &mut data).unwrap_err();
        assert!(err.to_string().contains("extra_field"));
    }

    #[test]
    fn test_keep_unknown_keys() {
        let shape = ObjectShape {
            unknown_keys: UnknownKeys::Keep,
            ..user_shape()
        };
        let mut data = json!({ "name": "Alice", "email": "a@test.com", "extra": 1 });
        validate_and_prepare(&shape, &mut data).unwrap();
        assert_eq!(data["extra"], json!(1));
    }

    #[test]
    fn test_nullable_required() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "publishedAt".into(),
            Property {
                nullable: true,
                ..required(Shape::Date)
            },
        );
        properties.insert("title".into(), required(Shape::String { values: None }));
        let shape = ObjectShape {
            properties,
            unknown_keys: UnknownKeys::Strip,
        };

        let result = validate(&shape, &json!({ "publishedAt": null, "title": null }));
        assert_eq!(result.errors, vec!["Required field 'title' is null".to_string()]);
    }

    #[test]
    fn test_null_rejected_unless_nullable() {
        let mut properties = BTreeMap::new();
        properties.insert("views".into(), prop(Shape::Number));
        properties.insert(
            "archivedAt".into(),
            Property {
                nullable: true,
                ..prop(Shape::Date)
            },
        );
        let shape = ObjectShape {
            properties,
            unknown_keys: UnknownKeys::Strip,
        };

        let result = validate(&shape, &json!({ "views": null, "archivedAt": null }));
        assert_eq!(result.errors, vec!["Field 'views' is not nullable".to_string()]);
        assert!(validate(&shape, &json!({})).is_ok());
    }

    #[test]
    fn test_reference_shape() {
        let mut author_props = BTreeMap::new();
        author_props.insert("name".into(), required(Shape::String { values: None }));
        let mut properties = BTreeMap::new();
        properties.insert(
            "author".into(),
            prop(Shape::Reference {
                collection: "authors".into(),
                entry: Some(Box::new(ObjectShape {
                    properties: author_props,
                    unknown_keys: UnknownKeys::Strip,
                })),
            }),
        );
        let shape = ObjectShape {
            properties,
            unknown_keys: UnknownKeys::Strip,
        };

        assert!(validate(&shape, &json!({ "author": { "id": "alice", "collection": "authors" } })).is_ok());

        let wrong_target =
            validate(&shape, &json!({ "author": { "id": "alice", "collection": "users" } }));
        assert!(wrong_target.errors[0].contains("must reference collection 'authors'"));

        let not_object = validate(&shape, &json!({ "author": "alice" }));
        assert!(not_object.errors[0].contains("expected reference"));

        let bad_entry = validate(
            &shape,
            &json!({ "author": { "id": "alice", "collection": "authors", "entry": {} } }),
        );
        assert_eq!(
            bad_entry.errors,
            vec!["Required field 'author.entry.name' is missing".to_string()]
        );
    }

    #[test]
    fn test_non_object_document() {
        let result = validate(&user_shape(), &json!([1, 2]));
        assert!(result.errors[0].contains("must be an object"));
    }
}
