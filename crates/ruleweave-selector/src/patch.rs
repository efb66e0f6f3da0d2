//! Path lookup and dotted-key patching on JSON trees.

use serde_json::{Map, Value};

use crate::error::SelectorError;
use crate::parser::PathSegment;

/// Value at a concrete path.
pub fn value_at<'a>(tree: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(tree, |current, segment| match segment {
        PathSegment::Key(key) => current.as_object()?.get(key),
        PathSegment::Index(index) => current.as_array()?.get(*index),
    })
}

/// Mutable value at a concrete path.
pub fn value_at_mut<'a>(tree: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let mut current = tree;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            PathSegment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(current)
}

/// Assign `value` at a dotted key inside `target`.
///
/// Missing intermediate objects are created. An intermediate that exists
/// but is not an object is a `TypeMismatch`; nothing is modified then.
pub fn set_dotted(target: &mut Value, key: &str, value: Value) -> Result<(), SelectorError> {
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(SelectorError::TypeMismatch {
            key: key.to_string(),
            message: "empty key segment".to_string(),
        });
    }

    let mismatch = |message: String| SelectorError::TypeMismatch {
        key: key.to_string(),
        message,
    };

    let Some(mut current) = target.as_object_mut() else {
        return Err(mismatch("selected value is not an object".to_string()));
    };

    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| mismatch("empty key".to_string()))?;

    // Check the whole chain before creating anything
    {
        let mut probe: Option<&Map<String, Value>> = Some(&*current);
        for segment in parents {
            match probe.and_then(|m| m.get(*segment)) {
                Some(Value::Object(next)) => probe = Some(next),
                Some(_) => return Err(mismatch(format!("'{}' is not an object", segment))),
                None => probe = None,
            }
        }
    }

    for segment in parents {
        current = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| mismatch(format!("'{}' is not an object", segment)))?;
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

/// Remove a dotted key from `target`. Returns whether anything was removed.
pub fn remove_dotted(target: &mut Value, key: &str) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = target;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(next) if next.is_object() => current = next,
            _ => return false,
        }
    }
    current
        .as_object_mut()
        .map_or(false, |map| map.remove(*leaf).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_at() {
        let tree = json!({"a": [{"b": 1}]});
        let path = vec![
            PathSegment::Key("a".to_string()),
            PathSegment::Index(0),
            PathSegment::Key("b".to_string()),
        ];
        assert_eq!(value_at(&tree, &path), Some(&json!(1)));
        assert_eq!(value_at(&tree, &path[..1]).unwrap().as_array().unwrap().len(), 1);
        assert!(value_at(&tree, &[PathSegment::Index(0)]).is_none());
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut target = json!({"heading": "Testing"});
        set_dotted(&mut target, "vendor.cursor.alwaysApply", json!(true)).unwrap();
        assert_eq!(target["vendor"]["cursor"]["alwaysApply"], true);

        set_dotted(&mut target, "severity", json!("critical")).unwrap();
        assert_eq!(target["severity"], "critical");
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut once = json!({});
        set_dotted(&mut once, "a.b", json!(1)).unwrap();
        let mut twice = once.clone();
        set_dotted(&mut twice, "a.b", json!(1)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_set_through_scalar_is_mismatch_and_untouched() {
        let mut target = json!({"a": 5});
        let before = target.clone();
        assert!(set_dotted(&mut target, "a.b.c", json!(1)).is_err());
        assert_eq!(target, before);

        let mut scalar = json!("text");
        assert!(set_dotted(&mut scalar, "a", json!(1)).is_err());
    }

    #[test]
    fn test_remove() {
        let mut target = json!({"vendor": {"cursor": {"globs": []}, "claude": {}}});
        assert!(remove_dotted(&mut target, "vendor.cursor"));
        assert!(!remove_dotted(&mut target, "vendor.cursor"));
        assert!(!remove_dotted(&mut target, "missing.key"));
        assert_eq!(target, json!({"vendor": {"claude": {}}}));
    }
}
