//! JSON Patch documents applied to an item before it is saved.
//!
//! Supports the `add`, `replace` and `remove` operations on JSON pointer
//! paths. Other operations are rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
}

impl PatchOperation {
    fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path } => path,
        }
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Splits a pointer into its parent pointer and last reference token.
fn split_pointer(path: &str) -> Result<(&str, String), ApiError> {
    if !path.starts_with('/') {
        return Err(ApiError::validation(
            "path",
            format!("'{}' is not a JSON pointer", path),
        ));
    }
    let (parent, last) = path.rsplit_once('/').unwrap_or(("", path));
    Ok((parent, unescape(last)))
}

/// Pointer tokens follow the wire names, which are camelCase. Object keys
/// are matched ignoring ASCII case so that `/Name` addresses `name`.
fn object_key(map: &serde_json::Map<String, Value>, key: &str) -> String {
    map.keys()
        .find(|k| k.eq_ignore_ascii_case(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

fn invalid_path(path: &str) -> ApiError {
    ApiError::validation("path", format!("Path '{}' does not exist", path))
}

fn apply_one(document: &mut Value, operation: PatchOperation) -> Result<(), ApiError> {
    let path = operation.path().to_string();
    let (parent_path, key) = split_pointer(&path)?;
    let parent = document
        .pointer_mut(parent_path)
        .ok_or_else(|| invalid_path(&path))?;

    match (parent, operation) {
        (Value::Object(map), PatchOperation::Add { value, .. }) => {
            let key = object_key(map, &key);
            map.insert(key, value);
        }
        (Value::Object(map), PatchOperation::Replace { value, .. }) => {
            // Missing optional fields are omitted when serialized, so a
            // replace on them behaves like add.
            let key = object_key(map, &key);
            map.insert(key, value);
        }
        (Value::Object(map), PatchOperation::Remove { .. }) => {
            let key = object_key(map, &key);
            map.remove(&key).ok_or_else(|| invalid_path(&path))?;
        }
        (Value::Array(items), PatchOperation::Add { value, .. }) => {
            let index = if key == "-" {
                items.len()
            } else {
                key.parse::<usize>()
                    .ok()
                    .filter(|i| *i <= items.len())
                    .ok_or_else(|| invalid_path(&path))?
            };
            items.insert(index, value);
        }
        (Value::Array(items), PatchOperation::Replace { value, .. }) => {
            let slot = key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| invalid_path(&path))?;
            *slot = value;
        }
        (Value::Array(items), PatchOperation::Remove { .. }) => {
            let index = key
                .parse::<usize>()
                .ok()
                .filter(|i| *i < items.len())
                .ok_or_else(|| invalid_path(&path))?;
            items.remove(index);
        }
        _ => return Err(invalid_path(&path)),
    }
    Ok(())
}

/// Applies every operation in order. The document is left untouched when
/// any operation fails.
pub fn apply_patch(document: &Value, operations: Vec<PatchOperation>) -> Result<Value, ApiError> {
    let mut patched = document.clone();
    for operation in operations {
        apply_one(&mut patched, operation)?;
    }
    Ok(patched)
}
