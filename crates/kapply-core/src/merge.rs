//! Three-way merge of desired, last-applied and live objects
//!
//! The merged object starts from the live object. Every field present in
//! the desired object overwrites the live one; mappings are merged
//! recursively, scalars and sequences are replaced. A field that was part
//! of the last applied configuration but is missing from the desired object
//! is removed. Fields that were never applied (set out-of-band, or owned by
//! the server) are left untouched. An explicit `null` in the desired object
//! removes the field.
//!
//! The last applied configuration is recorded on the object itself under
//! [`LAST_APPLIED_ANNOTATION`], the same place `kubectl apply` keeps it.

use serde_json::{Map, Value};

use crate::error::Result;

/// Annotation holding the JSON of the last applied configuration
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Metadata fields owned by the server. They are never taken from a desired
/// object and never recorded as applied.
const SERVER_METADATA_FIELDS: &[&str] = &[
    "creationTimestamp",
    "generation",
    "managedFields",
    "resourceVersion",
    "selfLink",
    "uid",
];

/// Serialize the configuration that is recorded as "last applied"
///
/// This is `desired` without server-owned metadata and without the
/// last-applied annotation itself.
pub fn last_applied_configuration(desired: &Value) -> Result<String> {
    let mut recorded = strip_server_fields(desired);
    if let Some(metadata) = metadata_mut(&mut recorded) {
        let now_empty = match metadata.get_mut("annotations") {
            Some(Value::Object(annotations)) => {
                annotations.remove(LAST_APPLIED_ANNOTATION);
                annotations.is_empty()
            }
            _ => false,
        };
        if now_empty {
            metadata.remove("annotations");
        }
    }
    Ok(serde_json::to_string(&recorded)?)
}

/// Prepare a desired object for sending: strip server-owned metadata and
/// record the last-applied annotation
pub fn annotate_last_applied(desired: &Value) -> Result<Value> {
    let recorded = last_applied_configuration(desired)?;
    let mut prepared = strip_server_fields(desired);

    if let Some(metadata) = metadata_mut(&mut prepared) {
        let annotations = metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Value::Object(annotations) = annotations {
            annotations.insert(
                LAST_APPLIED_ANNOTATION.to_string(),
                Value::String(recorded),
            );
        }
    }

    Ok(prepared)
}

/// Read the last applied configuration recorded on a live object
///
/// Returns `None` when the annotation is absent or does not hold valid JSON.
pub fn read_last_applied(live: &Value) -> Option<Value> {
    live.pointer("/metadata/annotations")
        .and_then(Value::as_object)
        .and_then(|annotations| annotations.get(LAST_APPLIED_ANNOTATION))
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str(raw).ok())
}

/// Merge `desired` into `live` using `last_applied` to decide which omitted
/// fields to remove
pub fn three_way_merge(last_applied: Option<&Value>, desired: &Value, live: &Value) -> Value {
    merge_value(last_applied, desired, Some(live))
}

fn merge_value(last: Option<&Value>, desired: &Value, live: Option<&Value>) -> Value {
    let (Value::Object(desired_map), Some(Value::Object(live_map))) = (desired, live) else {
        return desired.clone();
    };

    let last_map = last.and_then(Value::as_object);
    let mut merged = live_map.clone();

    for (key, desired_value) in desired_map {
        if desired_value.is_null() {
            merged.remove(key);
            continue;
        }
        let value = merge_value(
            last_map.and_then(|m| m.get(key)),
            desired_value,
            live_map.get(key),
        );
        merged.insert(key.clone(), value);
    }

    if let Some(last_map) = last_map {
        for key in last_map.keys() {
            if !desired_map.contains_key(key) {
                merged.remove(key);
            }
        }
    }

    Value::Object(merged)
}

/// Paths (JSON pointer form) whose values differ between two objects
///
/// Mappings are compared key by key, anything else as a whole.
pub fn changed_paths(before: &Value, after: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_changes("", before, after, &mut paths);
    paths
}

fn collect_changes(prefix: &str, before: &Value, after: &Value, out: &mut Vec<String>) {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut keys: Vec<&String> = b.keys().chain(a.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = format!("{}/{}", prefix, escape_pointer(key));
                match (b.get(key), a.get(key)) {
                    (Some(bv), Some(av)) => collect_changes(&path, bv, av, out),
                    _ => out.push(path),
                }
            }
        }
        _ if before != after => out.push(if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }),
        _ => {}
    }
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn strip_server_fields(object: &Value) -> Value {
    let mut stripped = object.clone();
    if let Some(metadata) = metadata_mut(&mut stripped) {
        for field in SERVER_METADATA_FIELDS {
            metadata.remove(*field);
        }
    }
    if let Value::Object(map) = &mut stripped {
        map.remove("status");
    }
    stripped
}

fn metadata_mut(object: &mut Value) -> Option<&mut Map<String, Value>> {
    object
        .as_object_mut()
        .and_then(|map| map.get_mut("metadata"))
        .and_then(Value::as_object_mut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_desired_keys_and_keeps_out_of_band() {
        let last = json!({ "data": { "key1": "apple" } });
        let desired = json!({ "data": { "key1": "orange" } });
        let live = json!({
            "metadata": { "resourceVersion": "7" },
            "data": { "key1": "apple", "key2": "set-by-someone-else" }
        });

        let merged = three_way_merge(Some(&last), &desired, &live);

        assert_eq!(merged["data"]["key1"], "orange");
        assert_eq!(merged["data"]["key2"], "set-by-someone-else");
        assert_eq!(merged["metadata"]["resourceVersion"], "7");
    }

    #[test]
    fn test_merge_removes_previously_applied_keys() {
        let last = json!({ "data": { "key1": "apple", "old": "x" } });
        let desired = json!({ "data": { "key1": "apple" } });
        let live = json!({ "data": { "key1": "apple", "old": "x", "manual": "y" } });

        let merged = three_way_merge(Some(&last), &desired, &live);

        assert_eq!(merged, json!({ "data": { "key1": "apple", "manual": "y" } }));
    }

    #[test]
    fn test_merge_without_last_applied_never_removes() {
        let desired = json!({ "data": { "key1": "apple" } });
        let live = json!({ "data": { "key1": "apple", "old": "x" } });

        let merged = three_way_merge(None, &desired, &live);

        assert_eq!(merged, live);
    }

    #[test]
    fn test_merge_null_removes_field() {
        let desired = json!({ "data": { "key1": null } });
        let live = json!({ "data": { "key1": "apple", "key2": "pear" } });

        let merged = three_way_merge(None, &desired, &live);

        assert_eq!(merged, json!({ "data": { "key2": "pear" } }));
    }

    #[test]
    fn test_merge_replaces_sequences() {
        let desired = json!({ "spec": { "ports": [80] } });
        let live = json!({ "spec": { "ports": [80, 443], "type": "ClusterIP" } });

        let merged = three_way_merge(None, &desired, &live);

        assert_eq!(merged, json!({ "spec": { "ports": [80], "type": "ClusterIP" } }));
    }

    #[test]
    fn test_merge_identical_is_noop() {
        let desired = json!({ "kind": "ConfigMap", "data": { "k": "v" } });
        let live = json!({
            "kind": "ConfigMap",
            "metadata": { "uid": "abc" },
            "data": { "k": "v" }
        });

        assert_eq!(three_way_merge(Some(&desired), &desired, &live), live);
    }

    #[test]
    fn test_annotate_records_configuration() {
        let desired = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm", "resourceVersion": "3" },
            "data": { "k": "v" }
        });

        let prepared = annotate_last_applied(&desired).unwrap();

        assert!(prepared.pointer("/metadata/resourceVersion").is_none());
        let recorded = read_last_applied(&prepared).unwrap();
        assert_eq!(
            recorded,
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": { "name": "cm" },
                "data": { "k": "v" }
            })
        );
    }

    #[test]
    fn test_annotate_is_stable() {
        let desired = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "cm", "annotations": { "team": "a" } }
        });

        let once = annotate_last_applied(&desired).unwrap();
        let twice = annotate_last_applied(&once).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once["metadata"]["annotations"]["team"], "a");
    }

    #[test]
    fn test_read_last_applied_ignores_garbage() {
        let live = json!({
            "metadata": { "annotations": { LAST_APPLIED_ANNOTATION: "{not json" } }
        });
        assert!(read_last_applied(&live).is_none());
        assert!(read_last_applied(&json!({})).is_none());
    }

    #[test]
    fn test_changed_paths() {
        let before = json!({ "data": { "a": "1", "b": "2" }, "kind": "ConfigMap" });
        let after = json!({ "data": { "a": "1", "b": "3", "c/d": "4" }, "kind": "ConfigMap" });

        assert_eq!(changed_paths(&before, &after), vec!["/data/b", "/data/c~1d"]);
        assert!(changed_paths(&before, &before).is_empty());
    }
}
