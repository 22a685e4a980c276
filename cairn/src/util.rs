use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

fn safe_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static pattern compiles")
    })
}

/// Whether `name` can be used as a single path component (entry id, asset filename,
/// collection or global name) without escaping its directory.
pub fn is_safe_name(name: &str) -> bool {
    name.len() <= 255 && safe_name_pattern().is_match(name)
}

/// Parse an ISO-8601 date or date-time string. Offsetless values are taken as UTC.
pub fn parse_iso_date(s: &str) -> Option<DateTime<Utc>> {
    // Cheap shape check first so ordinary strings don't go through four parsers
    let bytes = s.as_bytes();
    if bytes.len() < 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Look up a dotted path (`author.id`, `tags.0`) inside a JSON value.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Order two non-null values of compatible types. Numbers compare numerically,
/// strings that both parse as ISO dates compare chronologically, other strings
/// compare case-insensitively. Returns None for incomparable pairs.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(compare_strings(x, y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_strings(a: &str, b: &str) -> Ordering {
    if let (Some(x), Some(y)) = (parse_iso_date(a), parse_iso_date(b)) {
        return x.cmp(&y);
    }
    // On case-only differences lowercase sorts first
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Key a value is sorted by. Ranks are fixed (missing/null, booleans, numbers,
/// ISO dates, other strings, lists, objects) and each rank has its own total
/// order, so mixed columns still sort consistently.
#[derive(Debug, Clone)]
pub enum SortKey {
    Missing,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    /// Case-folded text, then the original with lowercase first on ties
    Text { folded: String, original: String },
    List,
    Object,
}

impl SortKey {
    pub fn of(value: Option<&Value>) -> SortKey {
        match value {
            None | Some(Value::Null) => SortKey::Missing,
            Some(Value::Bool(b)) => SortKey::Bool(*b),
            Some(Value::Number(n)) => n.as_f64().map_or(SortKey::Missing, SortKey::Number),
            Some(Value::String(s)) => match parse_iso_date(s) {
                Some(date) => SortKey::Date(date),
                None => SortKey::Text {
                    folded: s.to_lowercase(),
                    original: s.clone(),
                },
            },
            Some(Value::Array(_)) => SortKey::List,
            Some(Value::Object(_)) => SortKey::Object,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Missing => 0,
            SortKey::Bool(_) => 1,
            SortKey::Number(_) => 2,
            SortKey::Date(_) => 3,
            SortKey::Text { .. } => 4,
            SortKey::List => 5,
            SortKey::Object => 6,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (
                SortKey::Text { folded: fa, original: oa },
                SortKey::Text { folded: fb, original: ob },
            ) => fa.cmp(fb).then_with(|| ob.cmp(oa)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

/// Sort ordering over optional values: missing and null sort before everything
/// else. See [`SortKey`].
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    SortKey::of(a).cmp(&SortKey::of(b))
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("hello-world"));
        assert!(is_safe_name("logo.png"));
        assert!(is_safe_name("2024_post.v2"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name(".hidden"));
        assert!(!is_safe_name("a/b"));
        assert!(!is_safe_name("a\\b"));
        assert!(!is_safe_name("with space"));
    }

    #[test]
    fn test_parse_iso_date_variants() {
        assert!(parse_iso_date("2026-02-13").is_some());
        assert!(parse_iso_date("2026-02-13T10:00:00Z").is_some());
        assert!(parse_iso_date("2026-02-13T10:00:00.123+02:00").is_some());
        assert!(parse_iso_date("2026-02-13T10:00:00").is_some());
        assert!(parse_iso_date("hello").is_none());
        assert!(parse_iso_date("2026-13-45").is_none());
    }

    #[test]
    fn test_dates_compare_chronologically() {
        // Offsets make lexical order disagree with chronological order
        let earlier = json!("2026-01-01T10:00:00+05:00");
        let later = json!("2026-01-01T06:00:00Z");
        assert_eq!(compare_values(&earlier, &later), Some(Ordering::Less));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(compare_values(&json!(9), &json!(10)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
    }

    #[test]
    fn test_strings_ignore_case() {
        assert_eq!(
            compare_values(&json!("apple"), &json!("Banana")),
            Some(Ordering::Less)
        );
        assert_eq!(compare_values(&json!("a"), &json!("A")), Some(Ordering::Less));
    }

    #[test]
    fn test_nulls_sort_first() {
        assert_eq!(compare_for_sort(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(
            compare_for_sort(Some(&json!(null)), Some(&json!("x"))),
            Ordering::Less
        );
        assert_eq!(compare_for_sort(None, Some(&Value::Null)), Ordering::Equal);
    }

    #[test]
    fn test_sort_order_is_transitive_across_dates_and_text() {
        let a = json!("2026-01-01T10:00:00+05:00");
        let b = json!("2026-01-01T06:00:00Z");
        let c = json!("2026-01-01T07 not a date");
        assert_eq!(compare_for_sort(Some(&a), Some(&b)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&b), Some(&c)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&a), Some(&c)), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&json!(3)), Some(&json!("1"))), Ordering::Less);
        assert_eq!(compare_for_sort(Some(&json!("b")), Some(&json!("B"))), Ordering::Less);
    }

    #[test]
    fn test_get_path() {
        let value = json!({ "author": { "id": "alice" }, "tags": ["a", "b"] });
        assert_eq!(get_path(&value, "author.id"), Some(&json!("alice")));
        assert_eq!(get_path(&value, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&value, "author.name"), None);
        assert_eq!(get_path(&value, "tags.x"), None);
    }
}
