//! Declarative schema → validator shape translation.

use crate::schema::{FieldDefinition, FieldType, ObjectSchema};
use crate::validation::{ObjectShape, Property, Shape, UnknownKeys};
use std::collections::BTreeMap;

/// Translate a collection schema into a validator shape. Reference fields are
/// expanded with the target collection's shape taken from `all_schemas`; inside
/// that inlined shape references are not expanded again, so self-references
/// and cycles stop after one level.
pub fn convert_schema(
    schema: &ObjectSchema,
    all_schemas: &BTreeMap<String, ObjectSchema>,
) -> ObjectShape {
    convert_object(schema, Some(all_schemas))
}

/// Translate a schema without inlining referenced collections. References are
/// checked for their `{ id, collection }` shape only.
pub fn convert_schema_shallow(schema: &ObjectSchema) -> ObjectShape {
    convert_object(schema, None)
}

fn convert_object(
    schema: &ObjectSchema,
    all_schemas: Option<&BTreeMap<String, ObjectSchema>>,
) -> ObjectShape {
    let unknown_keys = if schema.strict {
        UnknownKeys::Reject
    } else if schema.additional_properties {
        UnknownKeys::Keep
    } else {
        UnknownKeys::Strip
    };

    ObjectShape {
        properties: convert_fields(&schema.fields, all_schemas),
        unknown_keys,
    }
}

fn convert_fields(
    fields: &BTreeMap<String, FieldDefinition>,
    all_schemas: Option<&BTreeMap<String, ObjectSchema>>,
) -> BTreeMap<String, Property> {
    fields
        .iter()
        .map(|(name, field)| {
            let property = Property {
                shape: convert_field(field, all_schemas),
                required: field.required,
                nullable: field.nullable,
                default: field.default.clone(),
            };
            (name.clone(), property)
        })
        .collect()
}

fn convert_field(
    field: &FieldDefinition,
    all_schemas: Option<&BTreeMap<String, ObjectSchema>>,
) -> Shape {
    match field.field_type {
        FieldType::String => Shape::String {
            values: field.enum_values.clone(),
        },
        FieldType::Number => Shape::Number,
        FieldType::Integer => Shape::Integer,
        FieldType::Boolean => Shape::Boolean,
        FieldType::Date => Shape::Date,
        FieldType::Json => Shape::Any,
        FieldType::List => Shape::List(Box::new(
            field
                .items
                .as_ref()
                .map(|items| convert_field(items, all_schemas))
                .unwrap_or(Shape::Any),
        )),
        FieldType::Object => match &field.fields {
            Some(fields) => Shape::Object(ObjectShape {
                properties: convert_fields(fields, all_schemas),
                unknown_keys: UnknownKeys::Strip,
            }),
            None => Shape::Object(ObjectShape {
                properties: BTreeMap::new(),
                unknown_keys: UnknownKeys::Keep,
            }),
        },
        FieldType::Reference => {
            let collection = field.collection.clone().unwrap_or_default();
            let entry = all_schemas
                .and_then(|all| all.get(&collection))
                .map(|target| Box::new(convert_object(target, None)));
            Shape::Reference { collection, entry }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema_str;
    use crate::validation::validate;
    use serde_json::json;

    fn schemas() -> BTreeMap<String, ObjectSchema> {
        parse_schema_str(
            r#"
collections:
  authors:
    fields:
      name: { type: string, required: true }
      mentor: { type: reference, collection: authors }
  posts:
    strict: true
    fields:
      title: { type: string, required: true }
      author: { type: reference, collection: authors, required: true }
      related: { type: list, items: { type: reference, collection: posts } }
      seo:
        type: object
        fields:
          description: { type: string }
"#,
        )
        .unwrap()
        .collections
    }

    #[test]
    fn test_reference_expands_target_shape() {
        let all = schemas();
        let shape = convert_schema(&all["posts"], &all);

        let Shape::Reference { collection, entry } = &shape.properties["author"].shape else {
            panic!("author should be a reference");
        };
        assert_eq!(collection, "authors");
        let entry = entry.as_ref().expect("author shape should be inlined");
        assert!(entry.properties["name"].required);
        assert_eq!(shape.unknown_keys, UnknownKeys::Reject);
    }

    #[test]
    fn test_self_reference_stops_after_one_level() {
        let all = schemas();
        let shape = convert_schema(&all["authors"], &all);

        let Shape::Reference { entry, .. } = &shape.properties["mentor"].shape else {
            panic!("mentor should be a reference");
        };
        let inlined = entry.as_ref().unwrap();
        assert_eq!(
            inlined.properties["mentor"].shape,
            Shape::Reference {
                collection: "authors".into(),
                entry: None
            }
        );
    }

    #[test]
    fn test_list_of_references() {
        let all = schemas();
        let shape = convert_schema(&all["posts"], &all);
        let Shape::List(items) = &shape.properties["related"].shape else {
            panic!("related should be a list");
        };
        assert!(matches!(**items, Shape::Reference { ref collection, .. } if collection == "posts"));
    }

    #[test]
    fn test_translated_shape_validates_payloads() {
        let all = schemas();
        let shape = convert_schema(&all["posts"], &all);

        let ok = json!({
            "title": "Hello",
            "author": { "id": "alice", "collection": "authors", "entry": { "name": "Alice" } },
            "seo": { "description": "d" }
        });
        assert!(validate(&shape, &ok).is_ok());

        let bad = json!({
            "title": "Hello",
            "author": { "id": "alice", "collection": "authors", "entry": { "name": 7 } }
        });
        let result = validate(&shape, &bad);
        assert_eq!(
            result.errors,
            vec!["Field 'author.entry.name' expected string, got number".to_string()]
        );
    }

    #[test]
    fn test_shallow_conversion_keeps_reference_shape_only() {
        let all = schemas();
        let shape = convert_schema_shallow(&all["posts"]);
        assert_eq!(
            shape.properties["author"].shape,
            Shape::Reference {
                collection: "authors".into(),
                entry: None
            }
        );
    }
}
