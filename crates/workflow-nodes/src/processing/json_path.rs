//! Dotted path access into JSON records
//!
//! Paths use dot notation for objects and brackets for array indices:
//! `address.city`, `items[0].name`, `[1].id`. Writes only support object
//! segments, creating intermediate objects as needed.

use serde_json::{Map, Value};

enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

/// Split a path into segments, or `None` if it is malformed
fn segments(path: &str) -> Option<Vec<Segment<'_>>> {
    let mut out = Vec::new();
    let mut remaining = path;

    while !remaining.is_empty() {
        if let Some(rest) = remaining.strip_prefix('[') {
            let end = rest.find(']')?;
            let index = rest[..end].parse::<usize>().ok()?;
            out.push(Segment::Index(index));
            remaining = &rest[end + 1..];
            remaining = remaining.strip_prefix('.').unwrap_or(remaining);
            continue;
        }

        let dot = remaining.find('.').unwrap_or(remaining.len());
        let bracket = remaining.find('[').unwrap_or(remaining.len());
        let (field, rest) = if dot < bracket {
            (&remaining[..dot], &remaining[dot + 1..])
        } else {
            (&remaining[..bracket], &remaining[bracket..])
        };
        if field.is_empty() {
            return None;
        }
        out.push(Segment::Field(field));
        remaining = rest;
    }

    Some(out)
}

/// Read the value at `path`. An empty path returns the whole value.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in segments(path)? {
        current = match segment {
            Segment::Field(field) => current.get(field)?,
            Segment::Index(index) => current.get(index)?,
        };
    }
    Some(current)
}

/// Write `new_value` at a dotted object path, creating parents
///
/// Fails when the path is empty, uses an index, or crosses a non-object.
pub fn set_path(target: &mut Map<String, Value>, path: &str, new_value: Value) -> Result<(), String> {
    let parts = segments(path).ok_or_else(|| format!("Malformed path '{}'", path))?;
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| "Target path cannot be empty".to_string())?;

    let mut current = target;
    for segment in parents {
        let Segment::Field(field) = segment else {
            return Err(format!("Array indices are not supported in target path '{}'", path));
        };
        let slot = current
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            _ => return Err(format!("'{}' in path '{}' is not an object", field, path)),
        };
    }

    match last {
        Segment::Field(field) => {
            current.insert(field.to_string(), new_value);
            Ok(())
        }
        Segment::Index(_) => Err(format!("Array indices are not supported in target path '{}'", path)),
    }
}

/// Remove the value at a dotted object path, returning it
pub fn remove_path(target: &mut Map<String, Value>, path: &str) -> Option<Value> {
    let parts = segments(path)?;
    let (last, parents) = parts.split_last()?;

    let mut current = target;
    for segment in parents {
        let Segment::Field(field) = segment else {
            return None;
        };
        current = current.get_mut(*field)?.as_object_mut()?;
    }

    match last {
        Segment::Field(field) => current.remove(*field),
        Segment::Index(_) => None,
    }
}
