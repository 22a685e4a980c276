mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::{FieldDefinition, FieldType, ObjectSchema, SchemaDefinition};
