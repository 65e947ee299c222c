//! Rendering of single trace events into Trace Event Format (TEF) JSON objects.
//!
//! Each event is rendered eagerly into one `String` holding a complete JSON
//! object literal plus the trailing `",\n"` separator. The separator is part of
//! the record on purpose: the session strips it from the very last record at
//! finalize time so the whole stream parses as a JSON array (see
//! [`crate::TraceSession::end`]).

use std::borrow::Cow;
use std::fmt;

/// The record separator appended to every rendered event.
pub(crate) const SEPARATOR: &str = ",\n";

/// A typed argument value attached to an event.
///
/// Values are JSON-encoded by the library; strings are escaped. Callers never
/// hand-write JSON fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A signed integer, rendered as a bare decimal.
    Int(i64),
    /// An unsigned integer, rendered as a bare decimal.
    Uint(u64),
    /// A float, rendered as a bare JSON number. Non-finite values have no JSON
    /// representation and render as `null`.
    Float(f64),
    /// A boolean, rendered as `true`/`false`.
    Bool(bool),
    /// A string, rendered quoted and escaped.
    Str(String),
}

impl fmt::Display for ArgValue {
    /// Renders the value as a JSON literal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Uint(v) => write!(f, "{v}"),
            ArgValue::Float(v) if v.is_finite() => write!(f, "{v}"),
            ArgValue::Float(_) => f.write_str("null"),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Str(s) => write!(f, "\"{}\"", escape(s)),
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(v.into())
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::Uint(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::Uint(v.into())
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

/// Escapes a string for embedding inside a JSON string literal.
///
/// Borrows when no escaping is needed, which is the common case for event
/// names and categories.
fn escape(s: &str) -> Cow<'_, str> {
    if !s
        .chars()
        .any(|c| c == '"' || c == '\\' || (c as u32) < 0x20)
    {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Renders validated key/value pairs as `"key": value` joined by `", "`.
///
/// Length equality is checked by the session before this is called.
fn render_args(keys: &[&str], values: &[ArgValue]) -> String {
    keys.iter()
        .zip(values)
        .map(|(key, value)| format!("\"{}\": {}", escape(key), value))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn duration_begin(
    name: &str,
    category: &str,
    pid: u32,
    tid: u32,
    ts: u64,
    args: Option<(&[&str], &[ArgValue])>,
) -> String {
    let name = escape(name);
    let cat = escape(category);
    match args {
        None => format!(
            "{{\"name\": \"{name}\", \"cat\": \"{cat}\", \"ph\": \"B\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}}}{SEPARATOR}"
        ),
        Some((keys, values)) => {
            let args = render_args(keys, values);
            format!(
                "{{\"name\": \"{name}\", \"cat\": \"{cat}\", \"ph\": \"B\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}, \"args\": {{ {args}}} }}{SEPARATOR}"
            )
        }
    }
}

pub(crate) fn duration_end(
    pid: u32,
    tid: u32,
    ts: u64,
    args: Option<(&[&str], &[ArgValue])>,
) -> String {
    match args {
        None => format!("{{\"ph\": \"E\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}}}{SEPARATOR}"),
        Some((keys, values)) => {
            let args = render_args(keys, values);
            format!(
                "{{\"ph\": \"E\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}, \"args\": {{ {args}}} }}{SEPARATOR}"
            )
        }
    }
}

pub(crate) fn object_created(name: &str, identity: usize, pid: u32, tid: u32, ts: u64) -> String {
    let name = escape(name);
    format!(
        "{{\"name\": \"{name}\", \"ph\": \"N\", \"pid\": {pid}, \"tid\": {tid}, \"id\": {identity}, \"ts\": {ts}}}{SEPARATOR}"
    )
}

pub(crate) fn object_destroyed(name: &str, identity: usize, pid: u32, tid: u32, ts: u64) -> String {
    let name = escape(name);
    format!(
        "{{\"name\": \"{name}\", \"ph\": \"D\", \"pid\": {pid}, \"tid\": {tid}, \"id\": {identity}, \"ts\": {ts}}}{SEPARATOR}"
    )
}

pub(crate) fn instant_global(name: &str, pid: u32, tid: u32, ts: u64) -> String {
    let name = escape(name);
    format!(
        "{{\"name\": \"{name}\", \"ph\": \"i\", \"pid\": {pid}, \"tid\": {tid}, \"s\": \"g\", \"ts\": {ts}}}{SEPARATOR}"
    )
}

pub(crate) fn counter(
    name: &str,
    pid: u32,
    tid: u32,
    ts: u64,
    args: Option<(&[&str], &[ArgValue])>,
) -> String {
    let name = escape(name);
    match args {
        // A counter with no samples is unusual but kept: degraded events are
        // never dropped.
        None => format!(
            "{{\"name\": \"{name}\", \"ph\": \"C\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}}}{SEPARATOR}"
        ),
        Some((keys, values)) => {
            let args = render_args(keys, values);
            format!(
                "{{\"name\": \"{name}\", \"ph\": \"C\", \"pid\": {pid}, \"tid\": {tid}, \"ts\": {ts}, \"args\": {{ {args}}} }}{SEPARATOR}"
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_record(record: &str) -> serde_json::Value {
        let trimmed = record
            .strip_suffix(SEPARATOR)
            .expect("record must end with the separator");
        serde_json::from_str(trimmed).expect("record must be valid JSON")
    }

    #[test]
    fn duration_begin_shape() {
        let record = duration_begin("parse", "core", 1, 1, 42, None);
        let v = parse_record(&record);
        assert_eq!(v["name"], "parse");
        assert_eq!(v["cat"], "core");
        assert_eq!(v["ph"], "B");
        assert_eq!(v["ts"], 42);
        assert!(v.get("args").is_none());
    }

    #[test]
    fn duration_begin_with_args_shape() {
        let keys = ["bytes", "path"];
        let values = [ArgValue::Uint(512), ArgValue::Str("a.txt".into())];
        let record = duration_begin("read", "io", 1, 2, 7, Some((&keys, &values)));
        let v = parse_record(&record);
        assert_eq!(v["tid"], 2);
        assert_eq!(v["args"]["bytes"], 512);
        assert_eq!(v["args"]["path"], "a.txt");
    }

    #[test]
    fn duration_end_has_no_name() {
        let record = duration_end(1, 1, 99, None);
        let v = parse_record(&record);
        assert_eq!(v["ph"], "E");
        assert!(v.get("name").is_none());
    }

    #[test]
    fn instant_carries_global_scope() {
        let v = parse_record(&instant_global("tick", 1, 1, 3));
        assert_eq!(v["ph"], "i");
        assert_eq!(v["s"], "g");
    }

    #[test]
    fn object_identity_renders_as_decimal() {
        let v = parse_record(&object_created("Foo", 0xABCD, 1, 1, 5));
        assert_eq!(v["id"], 43981);
        let v = parse_record(&object_destroyed("Foo", 0xABCD, 1, 1, 6));
        assert_eq!(v["id"], 43981);
    }

    #[test]
    fn counter_args_preserve_values() {
        let keys = ["cats", "dogs"];
        let values = [ArgValue::Int(3), ArgValue::Int(4)];
        let v = parse_record(&counter("pets", 1, 1, 10, Some((&keys, &values))));
        assert_eq!(v["ph"], "C");
        assert_eq!(v["args"]["cats"], 3);
        assert_eq!(v["args"]["dogs"], 4);
    }

    #[test]
    fn strings_are_escaped() {
        let v = parse_record(&instant_global("he said \"hi\"\n", 1, 1, 0));
        assert_eq!(v["name"], "he said \"hi\"\n");

        let value = [ArgValue::Str("back\\slash\tand tab".into())];
        let key = ["msg"];
        let v = parse_record(&duration_begin("x", "y", 1, 1, 0, Some((&key, &value))));
        assert_eq!(v["args"]["msg"], "back\\slash\tand tab");
    }

    #[test]
    fn escape_borrows_when_clean() {
        assert!(matches!(escape("plain name"), Cow::Borrowed(_)));
        assert!(matches!(escape("quo\"te"), Cow::Owned(_)));
    }

    #[test]
    fn arg_value_literals() {
        assert_eq!(ArgValue::Int(-5).to_string(), "-5");
        assert_eq!(ArgValue::Uint(5).to_string(), "5");
        assert_eq!(ArgValue::Float(1.5).to_string(), "1.5");
        assert_eq!(ArgValue::Float(f64::NAN).to_string(), "null");
        assert_eq!(ArgValue::Bool(true).to_string(), "true");
        assert_eq!(ArgValue::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(ArgValue::from(3i32), ArgValue::Int(3));
        assert_eq!(ArgValue::from("s"), ArgValue::Str("s".into()));
    }
}
