//! Creates Qase test runs from TestRail runs, and posts each run's results
//! (mapping TestRail's 5 baked-in statuses through `mapping.result_statuses`,
//! resolving assignees through `mapping.users`, and dispatching result
//! custom fields the same way the case importer does).

use railmigrate_core::fieldvalue::extract_entries;
use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::text::format_links_as_markdown;
use railmigrate_core::types::SourceResult;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub async fn create_run(
    qase: &QaseClient,
    project_code: &str,
    title: &str,
    case_ids: &[i64],
    config_ids: &[u64],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<u64> {
    let resolved_config_ids: Vec<u64> = config_ids
        .iter()
        .filter_map(|id| mapping.configurations.values().find(|&&v| v == *id).copied())
        .collect();

    let payload = json!({
        "title": title,
        "cases": case_ids,
        "configurations": resolved_config_ids,
    });

    let response: Value = qase.post(&format!("/run/{project_code}"), &payload).await?;
    let run_id = response
        .get("result")
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| IntegrationError::FieldReconciliation("missing run id".into()))?;

    stats.with_project(project_code, |p| p.runs.record_created());
    Ok(run_id)
}

pub async fn post_result(
    qase: &QaseClient,
    project_code: &str,
    run_id: u64,
    case_id: i64,
    result: &SourceResult,
    mapping: &MappingStore,
    stats: &Stats,
) -> Result<()> {
    let status_id = mapping
        .result_statuses
        .get(&result.status_id)
        .copied()
        .unwrap_or(result.status_id as u64);

    let mut custom_field_values = serde_json::Map::new();
    for (tr_field_id, raw) in &result.custom_fields {
        let Ok(parsed_id) = tr_field_id.trim_start_matches("custom_").parse::<u32>() else {
            continue;
        };
        let Some(qase_field_id) = mapping.custom_field_for_project(parsed_id, project_code) else {
            continue;
        };
        for entry in extract_entries(raw) {
            custom_field_values.insert(qase_field_id.to_string(), entry.value);
        }
    }

    let mut payload = json!({
        "case_id": case_id,
        "status": status_id,
        "comment": result.comment.as_deref().map(format_links_as_markdown).unwrap_or_default(),
        "custom_field": Value::Object(custom_field_values),
    });
    if let Some(member_id) = result.assignedto_id.and_then(|id| mapping.users.get(&id)) {
        payload["member_id"] = json!(member_id);
    }
    if let Some(elapsed) = &result.elapsed {
        payload["time"] = json!(elapsed);
    }

    let outcome: Result<Value> = qase
        .post(&format!("/result/{project_code}/{run_id}"), &payload)
        .await;

    match outcome {
        Ok(_) => stats.with_project(project_code, |p| p.results.record_created()),
        Err(e) => {
            warn!(case_id, run_id, error = %e, "failed to post result");
            stats.with_project(project_code, |p| p.results.record_failed());
            return Err(e);
        }
    }

    Ok(())
}
