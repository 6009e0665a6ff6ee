// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;

/// Rewrite legacy keys into the current schema.
///
/// Older files stored `sessions.encryption` as a boolean.
pub(super) fn migrate_on_load(mut value: Value) -> Value {
    if let Some(sessions) = value.get_mut("sessions").and_then(Value::as_object_mut) {
        if let Some(Value::Bool(enabled)) = sessions.get("encryption") {
            let policy = if *enabled { "auto" } else { "disabled" };
            sessions.insert("encryption".to_string(), Value::String(policy.to_string()));
        }
    }
    value
}

/// Deep-merge two JSON values.
/// `base` is existing file content, `overlay` is serialized current struct.
/// Overlay values take priority.
pub(super) fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = if let Some(base_val) = base_map.remove(&key) {
                    deep_merge(base_val, overlay_val)
                } else {
                    overlay_val
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_base, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_migrate_boolean_encryption() {
        let migrated = migrate_on_load(json!({"sessions": {"encryption": false}}));
        assert_eq!(migrated["sessions"]["encryption"], json!("disabled"));

        let migrated = migrate_on_load(json!({"sessions": {"encryption": true}}));
        assert_eq!(migrated["sessions"]["encryption"], json!("auto"));
    }

    #[test]
    fn test_migrate_leaves_current_schema_alone() {
        let value = json!({"sessions": {"encryption": "required"}});
        assert_eq!(migrate_on_load(value.clone()), value);
    }

    #[test]
    fn test_deep_merge_overlay_wins() {
        let merged = deep_merge(
            json!({"a": {"x": 1, "y": 2}, "keep": true}),
            json!({"a": {"x": 5}}),
        );
        assert_eq!(merged, json!({"a": {"x": 5, "y": 2}, "keep": true}));
    }
}
