//! Custom field values arrive from TestRail (and get sent to Qase) in one
//! of three JSON shapes. This module normalizes between them so the rest
//! of the engine can work with a single representation.

use serde_json::Value;
use std::collections::HashMap;

/// A custom field id paired with its value, in the normalized shape the
/// rest of the engine works with.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub field_id: String,
    pub value: Value,
}

/// The three payload shapes a `custom_fields` blob can arrive in:
///
/// - `ListForm`: `[{"field_id": "123", "value": "..."}]`, as produced by
///   some TestRail API responses.
/// - `FlatMap`: `{"123": "...", "456": "..."}`, stringified field ids as
///   object keys, as used by the Qase create/update payload.
/// - `Nested`: anything else — an arbitrarily nested structure that must be
///   walked recursively to pull out `{field_id, value}` pairs wherever they
///   occur.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValueShape {
    ListForm(Vec<FieldEntry>),
    FlatMap(HashMap<String, Value>),
    Nested(Value),
}

/// Classify a raw JSON value's custom-field shape.
pub fn detect_shape(raw: &Value) -> FieldValueShape {
    if let Value::Array(items) = raw {
        let entries: Option<Vec<FieldEntry>> = items
            .iter()
            .map(|item| {
                let obj = item.as_object()?;
                let field_id = obj.get("field_id")?.as_str()?.to_string();
                let value = obj.get("value")?.clone();
                Some(FieldEntry { field_id, value })
            })
            .collect();
        if let Some(entries) = entries {
            return FieldValueShape::ListForm(entries);
        }
    }

    if let Value::Object(map) = raw {
        let looks_flat = map.keys().all(|k| k.chars().all(|c| c.is_ascii_digit()));
        if looks_flat && !map.is_empty() {
            return FieldValueShape::FlatMap(map.clone().into_iter().collect());
        }
    }

    FieldValueShape::Nested(raw.clone())
}

/// Extract every `{field_id, value}` pair out of a custom-fields blob,
/// regardless of which of the three shapes it arrived in. For the `Nested`
/// fallback, walks the value tree looking for objects that carry both a
/// `field_id` and a `value` key at any depth.
pub fn extract_entries(raw: &Value) -> Vec<FieldEntry> {
    match detect_shape(raw) {
        FieldValueShape::ListForm(entries) => entries,
        FieldValueShape::FlatMap(map) => map
            .into_iter()
            .map(|(field_id, value)| FieldEntry { field_id, value })
            .collect(),
        FieldValueShape::Nested(value) => {
            let mut out = Vec::new();
            walk_nested(&value, &mut out);
            out
        }
    }
}

fn walk_nested(value: &Value, out: &mut Vec<FieldEntry>) {
    match value {
        Value::Object(map) => {
            if let (Some(field_id), Some(v)) = (map.get("field_id"), map.get("value")) {
                if let Some(field_id) = field_id.as_str() {
                    out.push(FieldEntry {
                        field_id: field_id.to_string(),
                        value: v.clone(),
                    });
                    return;
                }
            }
            for child in map.values() {
                walk_nested(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_nested(item, out);
            }
        }
        _ => {}
    }
}

/// Look up one field's value out of a raw custom-fields blob by its field
/// id, regardless of shape.
pub fn extract_value(raw: &Value, field_id: &str) -> Option<Value> {
    extract_entries(raw)
        .into_iter()
        .find(|entry| entry.field_id == field_id)
        .map(|entry| entry.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_list_form() {
        let raw = json!([{"field_id": "1", "value": "a"}, {"field_id": "2", "value": 5}]);
        match detect_shape(&raw) {
            FieldValueShape::ListForm(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected ListForm, got {other:?}"),
        }
    }

    #[test]
    fn detects_flat_map() {
        let raw = json!({"1": "a", "2": 5});
        match detect_shape(&raw) {
            FieldValueShape::FlatMap(map) => assert_eq!(map.len(), 2),
            other => panic!("expected FlatMap, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_nested_for_non_numeric_keys() {
        let raw = json!({"preconditions": "steps...", "nested": {"field_id": "9", "value": "z"}});
        match detect_shape(&raw) {
            FieldValueShape::Nested(_) => {}
            other => panic!("expected Nested, got {other:?}"),
        }
    }

    #[test]
    fn extract_entries_handles_all_three_shapes() {
        let list = json!([{"field_id": "1", "value": "a"}]);
        assert_eq!(extract_entries(&list).len(), 1);

        let flat = json!({"1": "a", "2": "b"});
        assert_eq!(extract_entries(&flat).len(), 2);

        let nested = json!({"wrapper": {"field_id": "3", "value": "c"}});
        let entries = extract_entries(&nested);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field_id, "3");
    }

    #[test]
    fn extract_value_finds_by_field_id() {
        let raw = json!([{"field_id": "7", "value": "found"}]);
        assert_eq!(extract_value(&raw, "7"), Some(json!("found")));
        assert_eq!(extract_value(&raw, "8"), None);
    }
}
