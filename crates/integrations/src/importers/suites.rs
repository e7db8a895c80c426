//! Creates Qase suites from TestRail suites, keyed in the mapping store as
//! `(project_code, suite name)`.

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::text::format_links_as_markdown;
use railmigrate_core::types::SourceSuite;
use serde_json::json;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub async fn import_suites(
    qase: &QaseClient,
    project_code: &str,
    suites: &[SourceSuite],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<()> {
    for suite in suites {
        let description = suite
            .description
            .as_deref()
            .map(format_links_as_markdown)
            .unwrap_or_default();

        let response: serde_json::Value = qase
            .post(
                &format!("/suite/{project_code}"),
                &json!({ "title": suite.name, "description": description }),
            )
            .await?;

        let suite_id = response
            .get("result")
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IntegrationError::FieldReconciliation("missing suite id".into()))?;

        mapping
            .suites
            .insert((project_code.to_string(), suite.name.clone()), suite_id);
        stats.with_project(project_code, |p| p.suites.record_created());
    }

    Ok(())
}
