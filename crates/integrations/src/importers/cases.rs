//! Creates Qase test cases from TestRail test cases: resolves the suite,
//! priority, and case-type mappings, rewrites step/attachment content
//! through the text transforms, dispatches custom field values through the
//! reconciled target fields according to each field's TestRail type, and
//! records the TestRail id -> Qase id mapping (applying id-safety hashing
//! when the source id doesn't fit a signed 32-bit field).

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::text::{
    convert_estimate_time_to_hours, convert_testrail_date_to_iso, format_links_as_markdown,
    format_refs_as_markdown_links,
};
use railmigrate_core::types::{normalize_field_name, SourceCase};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub struct CaseImportContext<'a> {
    pub project_code: &'a str,
    pub suite_name: &'a str,
    pub preserve_ids: bool,
    /// Base URL refs are joined onto when they aren't already absolute.
    /// `None` when the refs field is disabled or unconfigured.
    pub refs_base_url: Option<&'a str>,
}

fn step_json(content: &str, expected: &str) -> Value {
    json!({
        "action": format_links_as_markdown(content),
        "expected_result": format_links_as_markdown(expected),
    })
}

/// Translate a source enum value into its reconciled Qase id, falling back
/// to the raw key untranslated when the field has no mapping built (no
/// reconciliation ran) or the key itself has no match.
fn translate_enum_key(mapping: &MappingStore, tr_field_id: u32, key: &str) -> Value {
    match mapping.enum_value_id(tr_field_id, key) {
        Some(id) => json!(id),
        None => json!(key),
    }
}

fn multiselect_keys(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect(),
        Value::String(s) => s.split(',').map(|part| part.trim().to_string()).collect(),
        other => vec![other.to_string()],
    }
}

/// Dispatch one reconciled custom field's raw value onto its Qase shape,
/// per TestRail type: 6 (single-select) and 12 (multi-select) translate
/// through `tr_key_to_qase_id`; 8 (datepicker) is reparsed into Qase's ISO
/// date format; anything else is passed through unchanged.
fn dispatch_field_value(mapping: &MappingStore, tr_id: u32, tr_type: u32, raw: &Value) -> Value {
    match tr_type {
        6 => {
            let key = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
            translate_enum_key(mapping, tr_id, &key)
        }
        12 => {
            let translated: Vec<Value> = multiselect_keys(raw)
                .iter()
                .map(|key| translate_enum_key(mapping, tr_id, key))
                .collect();
            json!(translated)
        }
        8 => json!(convert_testrail_date_to_iso(raw.as_str().unwrap_or_default())),
        _ => raw.clone(),
    }
}

/// Build the step list out of a step-container field's raw value: an array
/// of `{content, expected, additional_info}` objects as TestRail's API
/// returns for `custom_steps_separated`-shaped fields.
fn steps_from_step_container(raw: &Value) -> Vec<Value> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| {
            let content = item.get("content").and_then(|v| v.as_str()).unwrap_or_default();
            let expected = item.get("expected").and_then(|v| v.as_str()).unwrap_or_default();
            step_json(content, expected)
        })
        .collect()
}

/// Build the step list out of a BDD scenario field's raw value: an array of
/// `{content}` objects, one column only (no separate expected result).
fn steps_from_bdd_scenario(raw: &Value) -> Vec<Value> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.get("content").and_then(|v| v.as_str()))
        .map(|content| step_json(content, ""))
        .collect()
}

pub async fn import_case(
    qase: &QaseClient,
    case: &SourceCase,
    ctx: &CaseImportContext<'_>,
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<i64> {
    let qase_case_id = mapping.record_case_id(case.id, ctx.preserve_ids);

    let suite_id = mapping
        .suites
        .get(&(ctx.project_code.to_string(), ctx.suite_name.to_string()))
        .copied();

    let mut steps: Vec<Value> = case
        .custom_steps_separated
        .iter()
        .map(|step| step_json(&step.content, step.expected.as_deref().unwrap_or_default()))
        .collect();

    let mut custom_field_values = serde_json::Map::new();
    let mut preconditions: Option<String> = None;

    for (raw_key, raw_value) in &case.custom_fields {
        let normalized = normalize_field_name(raw_key);

        if normalized == "preconds" {
            preconditions = raw_value.as_str().map(format_links_as_markdown);
            continue;
        }
        if normalized == "testrail_bdd_scenario" {
            steps = steps_from_bdd_scenario(raw_value);
            continue;
        }
        if mapping.step_fields.contains(normalized) {
            steps = steps_from_step_container(raw_value);
            continue;
        }

        let Some(entry) = mapping.resolve_field(normalized, ctx.project_code).copied() else {
            warn!(field = %raw_key, case_id = case.id, "no reconciled field for custom field, dropping value");
            continue;
        };

        let value = dispatch_field_value(mapping, entry.tr_id, entry.tr_type, raw_value);
        custom_field_values.insert(entry.qase_field_id.to_string(), value);
    }

    if let (Some(field_id), Some(estimate)) = (mapping.estimate_field_id, case.estimate.as_deref()) {
        custom_field_values.insert(
            field_id.to_string(),
            json!(convert_estimate_time_to_hours(estimate)),
        );
    }
    if let (Some(field_id), Some(refs)) = (mapping.refs_field_id, case.refs.as_deref()) {
        if let Some(base_url) = ctx.refs_base_url {
            custom_field_values.insert(
                field_id.to_string(),
                json!(format_refs_as_markdown_links(refs, base_url)),
            );
        }
    }
    if let Some(field_id) = mapping.testrail_original_id_field_id {
        custom_field_values.insert(field_id.to_string(), json!(case.id));
    }

    let mut payload = json!({
        "title": case.title,
        "suite_id": suite_id,
        "steps": steps,
        "custom_field": Value::Object(custom_field_values),
    });
    if let Some(text) = &preconditions {
        payload["preconditions"] = json!(text);
    }
    if let Some(priority_id) = case.priority_id.and_then(|id| mapping.priorities.get(&id)) {
        payload["priority_id"] = json!(priority_id);
    }
    if let Some(type_id) = case.type_id.and_then(|id| mapping.case_types.get(&id)) {
        payload["type_id"] = json!(type_id);
    }
    if ctx.preserve_ids {
        payload["id"] = json!(qase_case_id);
    }

    let outcome: Result<Value> = qase.post(&format!("/case/{}", ctx.project_code), &payload).await;
    match outcome {
        Ok(_) => stats.with_project(ctx.project_code, |p| p.cases.record_created()),
        Err(e) => {
            warn!(case_id = case.id, error = %e, "failed to create case");
            stats.with_project(ctx.project_code, |p| p.cases.record_failed());
            return Err(e);
        }
    }

    Ok(qase_case_id)
}

/// Validate that a case payload carries every system field Qase requires
/// before submission, surfacing a clear error instead of a rejected API call.
pub fn validate_payload(payload: &Value) -> Result<()> {
    if payload.get("title").and_then(|t| t.as_str()).unwrap_or_default().is_empty() {
        return Err(IntegrationError::FieldReconciliation("case title is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railmigrate_core::mapping::FieldRegistryEntry;

    #[test]
    fn validate_payload_rejects_empty_title() {
        let payload = json!({ "title": "" });
        assert!(validate_payload(&payload).is_err());
    }

    #[test]
    fn validate_payload_accepts_nonempty_title() {
        let payload = json!({ "title": "Case 1" });
        assert!(validate_payload(&payload).is_ok());
    }

    #[test]
    fn dispatch_translates_single_select_through_enum_map() {
        let mut mapping = MappingStore::new();
        mapping
            .tr_key_to_qase_id
            .insert(1, std::collections::HashMap::from([("3".to_string(), 30)]));
        let value = dispatch_field_value(&mapping, 1, 6, &json!("3"));
        assert_eq!(value, json!(30));
    }

    #[test]
    fn dispatch_falls_back_to_raw_key_when_unmapped() {
        let mapping = MappingStore::new();
        let value = dispatch_field_value(&mapping, 1, 6, &json!("3"));
        assert_eq!(value, json!("3"));
    }

    #[test]
    fn dispatch_translates_multiselect_array() {
        let mut mapping = MappingStore::new();
        mapping.tr_key_to_qase_id.insert(
            2,
            std::collections::HashMap::from([("1".to_string(), 10), ("2".to_string(), 20)]),
        );
        let value = dispatch_field_value(&mapping, 2, 12, &json!(["1", "2"]));
        assert_eq!(value, json!([10, 20]));
    }

    #[test]
    fn dispatch_reparses_datepicker_field() {
        let mapping = MappingStore::new();
        let value = dispatch_field_value(&mapping, 1, 8, &json!("3/23/2023"));
        assert_eq!(value, json!("2023-03-23 00:00:00"));
    }

    #[test]
    fn steps_from_step_container_builds_action_and_expected() {
        let raw = json!([
            { "content": "click https://x/y", "expected": "ok" },
            { "content": "submit", "expected": "done" },
        ]);
        let steps = steps_from_step_container(&raw);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["action"], json!("click [https://x/y](https://x/y)"));
        assert_eq!(steps[1]["expected_result"], json!("done"));
    }

    #[test]
    fn steps_from_bdd_scenario_uses_single_column() {
        let raw = json!([{ "content": "Given a user" }, { "content": "Then it passes" }]);
        let steps = steps_from_bdd_scenario(&raw);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["expected_result"], json!(""));
    }

    #[test]
    fn resolve_field_routes_through_project_scoped_registry() {
        let mut mapping = MappingStore::new();
        mapping.field_registry.insert(
            "severity_DEMO".to_string(),
            FieldRegistryEntry { tr_id: 1, tr_type: 6, qase_field_id: 99 },
        );
        let entry = mapping.resolve_field("severity", "DEMO").copied();
        assert_eq!(entry.unwrap().qase_field_id, 99);
    }
}
