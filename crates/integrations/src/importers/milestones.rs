//! Creates Qase milestones from TestRail milestones. TestRail milestones
//! can nest one level (`parent_id`); Qase has no native nesting, so a
//! nested milestone's name is prefixed with its parent's for traceability.

use chrono::{TimeZone, Utc};
use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::text::format_links_as_markdown;
use railmigrate_core::types::SourceMilestone;
use serde_json::json;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub async fn import_milestones(
    qase: &QaseClient,
    project_code: &str,
    milestones: &[SourceMilestone],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<()> {
    let by_id: std::collections::HashMap<u64, &SourceMilestone> =
        milestones.iter().map(|m| (m.id, m)).collect();

    for milestone in milestones {
        let title = match milestone.parent_id.and_then(|id| by_id.get(&id)) {
            Some(parent) => format!("{} / {}", parent.name, milestone.name),
            None => milestone.name.clone(),
        };

        let description = milestone
            .description
            .as_deref()
            .map(format_links_as_markdown)
            .unwrap_or_default();

        let due_date = milestone
            .due_on
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .map(|dt| dt.format("%Y-%m-%d").to_string());

        let mut payload = json!({
            "title": title,
            "description": description,
            "status": if milestone.is_completed { "completed" } else { "active" },
        });
        if let Some(due_date) = due_date {
            payload["due_date"] = json!(due_date);
        }

        let response: serde_json::Value = qase
            .post(&format!("/milestone/{project_code}"), &payload)
            .await?;

        let milestone_id = response
            .get("result")
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IntegrationError::FieldReconciliation("missing milestone id".into()))?;

        mapping
            .milestones
            .insert((project_code.to_string(), milestone.name.clone()), milestone_id);
        stats.with_project(project_code, |p| p.milestones.record_created());
    }

    Ok(())
}
