//! Creates Qase shared steps from TestRail shared step templates, keyed in
//! the mapping store as `(project_code, title)` so the case importer can
//! resolve a `custom_steps_separated` reference back to its Qase hash.

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::text::format_links_as_markdown;
use railmigrate_core::types::SourceSharedStep;
use serde_json::json;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub async fn import_shared_steps(
    qase: &QaseClient,
    project_code: &str,
    shared_steps: &[SourceSharedStep],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<()> {
    for shared_step in shared_steps {
        let steps: Vec<serde_json::Value> = shared_step
            .custom_steps_separated
            .iter()
            .map(|step| {
                json!({
                    "action": format_links_as_markdown(&step.content),
                    "expected_result": step
                        .expected
                        .as_deref()
                        .map(format_links_as_markdown)
                        .unwrap_or_default(),
                })
            })
            .collect();

        let response: serde_json::Value = qase
            .post(
                &format!("/shared_step/{project_code}"),
                &json!({ "title": shared_step.title, "steps": steps }),
            )
            .await?;

        let hash = response
            .get("result")
            .and_then(|r| r.get("hash"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| IntegrationError::FieldReconciliation("missing shared step hash".into()))?
            .to_string();

        mapping
            .shared_steps
            .insert((project_code.to_string(), shared_step.title.clone()), hash);
        stats.with_project(project_code, |p| p.shared_steps.record_created());
    }

    Ok(())
}
