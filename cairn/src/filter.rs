//! Declarative entry filters.
//!
//! Filters are written as JSON:
//!
//! ```json
//! { "status": "published", "views": { "$gte": 10 }, "$or": [{ "featured": true }, { "pinned": true }] }
//! ```
//!
//! Top-level keys are AND-ed. A plain value means equality; an object whose keys all
//! start with `$` is a set of operators. `$and`, `$or` and `$not` nest groups.
//! Evaluation never fails: unknown operators, malformed nodes and fields missing
//! from the entry simply don't match.

use crate::util::{compare_values, get_path};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub enum Filter {
    /// Every child matches (an empty list matches everything)
    And(Vec<Filter>),
    /// At least one child matches
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field { path: String, condition: Condition },
    /// A node that could not be understood; matches nothing
    Never,
}

#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Contains(Value),
    StartsWith(String),
    EndsWith(String),
    Regex(Regex),
    Exists(bool),
    Unsupported(String),
}

impl Filter {
    /// Parse a filter tree from its JSON form. Never fails; anything malformed
    /// becomes a node that matches nothing.
    pub fn from_json(value: &Value) -> Filter {
        let Some(map) = value.as_object() else {
            return Filter::Never;
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (key, operand) in map {
            let clause = match key.as_str() {
                "$and" => parse_group(operand).map_or(Filter::Never, Filter::And),
                "$or" => parse_group(operand).map_or(Filter::Never, Filter::Or),
                "$not" => Filter::Not(Box::new(Filter::from_json(operand))),
                op if op.starts_with('$') => {
                    log::debug!("Unknown filter group operator '{op}'");
                    Filter::Never
                }
                path => parse_field(path, operand),
            };
            clauses.push(clause);
        }

        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::And(clauses)
        }
    }

    /// A filter that matches everything.
    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn matches(&self, entry: &Value) -> bool {
        match self {
            Filter::And(children) => children.iter().all(|f| f.matches(entry)),
            Filter::Or(children) => children.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Field { path, condition } => condition.matches(get_path(entry, path)),
            Filter::Never => false,
        }
    }
}

/// Whether `entry` satisfies `filter`.
pub fn does_match_filter(entry: &Value, filter: &Filter) -> bool {
    filter.matches(entry)
}

impl From<Value> for Filter {
    fn from(value: Value) -> Self {
        Filter::from_json(&value)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Filter::from_json(&value))
    }
}

fn parse_group(operand: &Value) -> Option<Vec<Filter>> {
    operand
        .as_array()
        .map(|items| items.iter().map(Filter::from_json).collect())
}

fn parse_field(path: &str, operand: &Value) -> Filter {
    let operators = match operand.as_object() {
        Some(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        _ => {
            return Filter::Field {
                path: path.to_string(),
                condition: Condition::Eq(operand.clone()),
            }
        }
    };

    let mut conditions: Vec<Filter> = operators
        .iter()
        .map(|(op, arg)| Filter::Field {
            path: path.to_string(),
            condition: Condition::parse(op, arg),
        })
        .collect();

    if conditions.len() == 1 {
        conditions.remove(0)
    } else {
        Filter::And(conditions)
    }
}

impl Condition {
    fn parse(op: &str, arg: &Value) -> Condition {
        let string_arg = || arg.as_str().map(str::to_string);
        let parsed = match op {
            "$eq" => Some(Condition::Eq(arg.clone())),
            "$ne" => Some(Condition::Ne(arg.clone())),
            "$gt" => Some(Condition::Gt(arg.clone())),
            "$gte" => Some(Condition::Gte(arg.clone())),
            "$lt" => Some(Condition::Lt(arg.clone())),
            "$lte" => Some(Condition::Lte(arg.clone())),
            "$in" => arg.as_array().cloned().map(Condition::In),
            "$nin" => arg.as_array().cloned().map(Condition::Nin),
            "$contains" => Some(Condition::Contains(arg.clone())),
            "$startsWith" => string_arg().map(Condition::StartsWith),
            "$endsWith" => string_arg().map(Condition::EndsWith),
            "$regex" => arg.as_str().and_then(|p| Regex::new(p).ok()).map(Condition::Regex),
            "$exists" => arg.as_bool().map(Condition::Exists),
            _ => None,
        };
        parsed.unwrap_or_else(|| Condition::Unsupported(op.to_string()))
    }

    /// Evaluate against the field value, `None` when the field is absent.
    fn matches(&self, field: Option<&Value>) -> bool {
        let Some(value) = field else {
            return matches!(self, Condition::Exists(false));
        };

        match self {
            Condition::Eq(operand) => values_equal(value, operand),
            Condition::Ne(operand) => !values_equal(value, operand),
            Condition::Gt(operand) => ordered(value, operand, |o| o == Ordering::Greater),
            Condition::Gte(operand) => ordered(value, operand, |o| o != Ordering::Less),
            Condition::Lt(operand) => ordered(value, operand, |o| o == Ordering::Less),
            Condition::Lte(operand) => ordered(value, operand, |o| o != Ordering::Greater),
            Condition::In(options) => options.iter().any(|o| values_equal(value, o)),
            Condition::Nin(options) => !options.iter().any(|o| values_equal(value, o)),
            Condition::Contains(needle) => match (value, needle) {
                (Value::String(s), Value::String(n)) => s.contains(n.as_str()),
                (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
                _ => false,
            },
            Condition::StartsWith(prefix) => {
                value.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            Condition::EndsWith(suffix) => {
                value.as_str().is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            Condition::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            Condition::Exists(expected) => *expected,
            Condition::Unsupported(op) => {
                log::debug!("Unsupported filter operator '{op}'");
                false
            }
        }
    }
}

fn ordered(value: &Value, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    compare_values(value, operand).is_some_and(accept)
}

/// Deep equality where numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
