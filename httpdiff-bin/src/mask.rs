//! Path-addressed access to fields of a decoded JSON response.
//!
//! A path such as `data.items[0].ts` is split at its last dot: `data.items[0]` is looked up
//! as the JSONPath `$.data.items[0]` and must select exactly one object, and `ts` is the
//! leaf key read or written on that object. A path without a dot addresses a key of the
//! document root.

use jsonpath_lib::{replace_with, select};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("field path cannot end with a dot [{0}]")]
    TrailingDot(String),
    #[error("invalid field path [{0}]")]
    InvalidPath(String),
    #[error("field path cannot be resolved [{0}]")]
    Unresolved(String),
    #[error("field path matches more than one container [{0}]")]
    Ambiguous(String),
    #[error("jsonData is not a map [{0}]")]
    NotAMap(String),
    #[error("field value not found [{0}]")]
    NotFound(String),
}

/// Split `path` into the JSONPath query of its container, `None` for the root, and the leaf.
fn split(path: &str) -> Result<(Option<String>, &str), MaskError> {
    if path.ends_with('.') {
        return Err(MaskError::TrailingDot(path.into()));
    }
    let (container, leaf) = match path.rfind('.') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    if leaf.is_empty() {
        return Err(MaskError::InvalidPath(path.into()));
    }
    let query = if container.is_empty() {
        None
    } else {
        Some(format!("$.{}", container))
    };
    Ok((query, leaf))
}

fn with_container<R>(
    doc: &Value,
    query: &str,
    path: &str,
    read: impl FnOnce(&Map<String, Value>) -> R,
) -> Result<R, MaskError> {
    let found = select(doc, query).map_err(|_| MaskError::InvalidPath(path.into()))?;
    match found.as_slice() {
        [] => Err(MaskError::Unresolved(path.into())),
        [Value::Object(map)] => Ok(read(map)),
        [_] => Err(MaskError::NotAMap(path.into())),
        _ => Err(MaskError::Ambiguous(path.into())),
    }
}

/// Run `op` on the container of `path` and the leaf key.
fn update<R>(
    doc: &mut Value,
    path: &str,
    op: impl FnOnce(&mut Map<String, Value>, &str) -> R,
) -> Result<R, MaskError> {
    let (query, leaf) = split(path)?;
    let query = match query {
        Some(q) => q,
        None => {
            let map = doc
                .as_object_mut()
                .ok_or_else(|| MaskError::NotAMap(path.into()))?;
            return Ok(op(map, leaf));
        }
    };
    // a rejected path must leave the document untouched
    with_container(doc, &query, path, |_| ())?;

    let mut op = Some(op);
    let mut outcome = None;
    let updated = replace_with(std::mem::take(doc), &query, &mut |mut container: Value| {
        if let (Value::Object(map), Some(op)) = (&mut container, op.take()) {
            outcome = Some(op(map, leaf));
        }
        Some(container)
    })
    .map_err(|_| MaskError::InvalidPath(path.into()))?;
    *doc = updated;
    outcome.ok_or_else(|| MaskError::Unresolved(path.into()))
}

/// Read a copy of the value at `path`.
pub fn get(doc: &Value, path: &str) -> Result<Value, MaskError> {
    let (query, leaf) = split(path)?;
    let lookup = |map: &Map<String, Value>| {
        map.get(leaf)
            .cloned()
            .ok_or_else(|| MaskError::NotFound(path.into()))
    };
    match query {
        Some(q) => with_container(doc, &q, path, lookup)?,
        None => doc
            .as_object()
            .ok_or_else(|| MaskError::NotAMap(path.into()))
            .and_then(lookup),
    }
}

/// Replace the value at `path` with `null` and return what was there.
///
/// `None` means the leaf key was absent. The key is inserted as `null` in that case, so
/// masking a field present on only one side still makes both sides agree on it.
pub fn set_to_nil(doc: &mut Value, path: &str) -> Result<Option<Value>, MaskError> {
    update(doc, path, |map, leaf| map.insert(leaf.to_string(), Value::Null))
}

/// Write `value` at `path`, creating the leaf key if needed.
pub fn set_value(doc: &mut Value, path: &str, value: Value) -> Result<(), MaskError> {
    update(doc, path, |map, leaf| {
        map.insert(leaf.to_string(), value);
    })
}

/// Remove the leaf key at `path`, returning its value if it was present.
pub fn remove(doc: &mut Value, path: &str) -> Result<Option<Value>, MaskError> {
    update(doc, path, |map, leaf| map.remove(leaf))
}

/// Undo a [`set_to_nil`] using the value it returned.
pub fn restore(doc: &mut Value, path: &str, original: Option<Value>) -> Result<(), MaskError> {
    match original {
        Some(v) => set_value(doc, path, v),
        None => remove(doc, path).map(|_| ()),
    }
}
