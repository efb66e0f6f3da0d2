//! Canonical byte form and hashing
//!
//! Canonical bytes are RFC 8785 JCS: object keys sorted
//! lexicographically, array order preserved, no insignificant whitespace.
//! Before serialization, any object that declares
//! `_meta.volatile: ["dot.path", ...]` has exactly those paths removed
//! (relative to that object). The `_meta` object itself is kept.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::CanonicalizationError;

/// Key of the metadata object that may declare volatile paths.
pub const META_KEY: &str = "_meta";

/// Key inside `_meta` listing volatile dot paths.
pub const VOLATILE_KEY: &str = "volatile";

/// Produce the canonical byte form of a JSON value.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let filtered = strip_volatile(value)?;
    serde_json_canonicalizer::to_vec(&filtered)
        .map_err(|e| CanonicalizationError::Jcs(e.to_string()))
}

/// Canonicalize any serializable value.
///
/// The value is first converted into a JSON tree, which fails for maps
/// with non-string keys and for types whose `Serialize` impl errors.
pub fn canonicalize_serializable<T: Serialize + ?Sized>(
    value: &T,
) -> Result<Vec<u8>, CanonicalizationError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| CanonicalizationError::NotSerializable(e.to_string()))?;
    canonicalize(&tree)
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `hash_bytes(canonicalize(value))`.
pub fn hash_value(value: &Value) -> Result<String, CanonicalizationError> {
    Ok(hash_bytes(&canonicalize(value)?))
}

/// `hash_bytes(canonicalize_serializable(value))`.
pub fn hash_serializable<T: Serialize + ?Sized>(
    value: &T,
) -> Result<String, CanonicalizationError> {
    Ok(hash_bytes(&canonicalize_serializable(value)?))
}

/// Return a copy of `value` with every declared volatile path removed.
pub fn strip_volatile(value: &Value) -> Result<Value, CanonicalizationError> {
    let mut copy = value.clone();
    strip_in_place(&mut copy, "$")?;
    Ok(copy)
}

fn strip_in_place(value: &mut Value, at: &str) -> Result<(), CanonicalizationError> {
    match value {
        Value::Object(map) => {
            for path in volatile_paths(map, at)? {
                remove_dot_path(map, &path);
            }
            for (key, child) in map.iter_mut() {
                if key == META_KEY {
                    continue;
                }
                strip_in_place(child, &format!("{}.{}", at, key))?;
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter_mut().enumerate() {
                strip_in_place(item, &format!("{}[{}]", at, i))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn volatile_paths(map: &Map<String, Value>, at: &str) -> Result<Vec<String>, CanonicalizationError> {
    let Some(meta) = map.get(META_KEY) else {
        return Ok(Vec::new());
    };
    let Some(declared) = meta.as_object().and_then(|m| m.get(VOLATILE_KEY)) else {
        return Ok(Vec::new());
    };

    let invalid = |reason: &str| CanonicalizationError::InvalidVolatile {
        path: at.to_string(),
        reason: reason.to_string(),
    };

    let entries = declared
        .as_array()
        .ok_or_else(|| invalid("expected an array of dot paths"))?;

    let mut paths = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry
            .as_str()
            .ok_or_else(|| invalid("entries must be strings"))?;
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(invalid(&format!("malformed path '{}'", path)));
        }
        // _meta is never stripped
        if path.split('.').next() == Some(META_KEY) {
            continue;
        }
        paths.push(path.to_string());
    }
    Ok(paths)
}

fn remove_dot_path(map: &mut Map<String, Value>, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = map;
    for segment in segments {
        match current.get_mut(segment).and_then(Value::as_object_mut) {
            Some(next) => current = next,
            None => return,
        }
    }
    current.remove(leaf);
}
