//! Stored records are opaque JSON objects; the store adds `id` and `createdAt`.

use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Fields the store owns. Clients can neither set nor change them.
pub const SYSTEM_FIELDS: [&str; 2] = [ID_FIELD, CREATED_AT_FIELD];

/// Resolve a dotted path (`location.state`) inside a record.
pub fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// The `id` of a record as a string, if present.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// URL slug from a display name: lowercase ASCII words joined with `-`.
pub fn slugify(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut pending_dash = false;
    for c in source.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
