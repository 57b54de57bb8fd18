//! Dot-notation accessor for nested JSON values.
//!
//! Used everywhere a response-key expression addresses a payload:
//! - Nested map access (e.g. "data.attributes.price")
//! - Sequential access via purely numeric segments (e.g. "items.0.title")
//! - Literal dots in a key are escaped as `\.` (e.g. "og\.title")
//!
//! Lookup short-circuits to the caller's default the moment a segment is
//! absent or the current node is not indexable. Setting auto-creates the
//! intermediate containers the remaining path needs.

use serde_json::{json, Value};

/// Dot-path error
#[derive(Debug, thiserror::Error)]
pub enum DotPathError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Cannot set value at path: {0}")]
    CannotSetValue(String),
}

/// One parsed path segment: a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Accessor for nested values addressed by dot-notation paths.
pub struct DotPath;

impl DotPath {
    /// Split a path on unescaped dots, unescaping `\.` into a literal dot.
    ///
    /// A segment that is purely numeric addresses a sequential container;
    /// everything else addresses a mapping key.
    pub fn segments(path: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'.') => {
                    chars.next();
                    current.push('.');
                }
                '.' => {
                    out.push(Self::to_segment(&current));
                    current.clear();
                }
                other => current.push(other),
            }
        }
        out.push(Self::to_segment(&current));
        out
    }

    fn to_segment(raw: &str) -> Segment {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(idx) = raw.parse::<usize>() {
                return Segment::Index(idx);
            }
        }
        Segment::Key(raw.to_string())
    }

    /// Get a reference to the value at `path`, or `None` the moment a
    /// segment is absent or the current node is not indexable.
    pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
        if path.is_empty() {
            return None;
        }

        let mut current = root;
        for segment in Self::segments(path) {
            current = match (&segment, current) {
                (Segment::Key(k), Value::Object(map)) => map.get(k)?,
                (Segment::Index(i), Value::Array(arr)) => arr.get(*i)?,
                // A numeric key in the raw payload is still addressable.
                (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Get a clone of the value at `path`, falling back to `default`.
    pub fn get_or(root: &Value, path: &str, default: Value) -> Value {
        Self::get(root, path).cloned().unwrap_or(default)
    }

    /// Whether `path` resolves to any value (including `null`).
    pub fn has(root: &Value, path: &str) -> bool {
        Self::get(root, path).is_some()
    }

    /// Get the value at `path` rendered as a string.
    ///
    /// Strings come back verbatim; other scalars and composites are
    /// JSON-serialized.
    pub fn get_string(root: &Value, path: &str) -> Option<String> {
        Self::get(root, path).map(render_string)
    }

    /// Set `value` at `path`, auto-creating intermediate containers.
    ///
    /// A numeric segment creates/extends an array (padding with `null` up to
    /// the index); any other segment creates an object.
    pub fn set(root: &mut Value, path: &str, value: Value) -> Result<(), DotPathError> {
        if path.is_empty() {
            return Err(DotPathError::InvalidPath("empty path".to_string()));
        }

        let segments = Self::segments(path);
        let mut current = root;

        for (pos, segment) in segments.iter().enumerate() {
            let last = pos == segments.len() - 1;
            match segment {
                Segment::Key(k) => {
                    if k.is_empty() {
                        return Err(DotPathError::InvalidPath(format!(
                            "empty segment at position {} in '{}'",
                            pos, path
                        )));
                    }
                    if !current.is_object() {
                        *current = json!({});
                    }
                    let map = current.as_object_mut().ok_or_else(|| {
                        DotPathError::CannotSetValue(format!("not an object at '{}'", k))
                    })?;
                    if last {
                        map.insert(k.clone(), value);
                        return Ok(());
                    }
                    current = map.entry(k.clone()).or_insert(Value::Null);
                }
                Segment::Index(i) => {
                    if !current.is_array() {
                        *current = Value::Array(Vec::new());
                    }
                    let arr = current.as_array_mut().ok_or_else(|| {
                        DotPathError::CannotSetValue(format!("not an array at index {}", i))
                    })?;
                    while arr.len() <= *i {
                        arr.push(Value::Null);
                    }
                    if last {
                        arr[*i] = value;
                        return Ok(());
                    }
                    current = &mut arr[*i];
                }
            }
        }
        Ok(())
    }
}

/// Render a JSON value the way it should appear inside a concatenated
/// string (decorations, derived query parameters).
pub fn render_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_nested_map_and_index() {
        let v = json!({"results": [{"id": 1, "title": "A"}, {"id": 2}]});
        assert_eq!(DotPath::get(&v, "results.0.title"), Some(&json!("A")));
        assert_eq!(DotPath::get(&v, "results.1.id"), Some(&json!(2)));
        assert_eq!(DotPath::get(&v, "results.2.id"), None);
        assert_eq!(DotPath::get(&v, "results.0.missing"), None);
    }

    #[test]
    fn get_short_circuits_on_non_indexable() {
        let v = json!({"a": "scalar"});
        assert_eq!(DotPath::get(&v, "a.b.c"), None);
        assert_eq!(DotPath::get_or(&v, "a.b.c", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn escaped_dot_is_a_literal_key_character() {
        let v = json!({"og.title": "Hello"});
        assert_eq!(DotPath::get(&v, "og\\.title"), Some(&json!("Hello")));
        assert_eq!(DotPath::get(&v, "og.title"), None);
    }

    #[test]
    fn set_then_get_round_trip() {
        let mut v = json!({});
        DotPath::set(&mut v, "a.b.0.c", json!(42)).unwrap();
        assert_eq!(DotPath::get(&v, "a.b.0.c"), Some(&json!(42)));
        assert!(v["a"]["b"].is_array());
        assert!(DotPath::has(&v, "a.b.0.c"));
    }

    #[test]
    fn set_pads_arrays_with_null() {
        let mut v = json!({});
        DotPath::set(&mut v, "list.2", json!("x")).unwrap();
        assert_eq!(v["list"], json!([null, null, "x"]));
    }

    #[test]
    fn numeric_object_keys_still_resolve() {
        let v = json!({"attribute": {"0": {"href": "u"}}});
        assert_eq!(DotPath::get(&v, "attribute.0.href"), Some(&json!("u")));
    }
}
