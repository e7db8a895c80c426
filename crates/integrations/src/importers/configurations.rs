//! Creates Qase configuration groups/values from a TestRail project's
//! configuration groups, keyed in the mapping store as
//! `(project_code, "group:config")`.

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::types::SourceConfigGroup;
use serde_json::json;

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

pub async fn import_configurations(
    qase: &QaseClient,
    project_code: &str,
    groups: &[SourceConfigGroup],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> Result<()> {
    for group in groups {
        let response: serde_json::Value = qase
            .post(
                &format!("/configuration/{project_code}/group"),
                &json!({ "title": group.name }),
            )
            .await?;
        let group_id = response
            .get("result")
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_u64())
            .ok_or_else(|| IntegrationError::FieldReconciliation("missing group id".into()))?;

        for config in &group.configs {
            let response: serde_json::Value = qase
                .post(
                    &format!("/configuration/{project_code}"),
                    &json!({ "title": config.name, "group_id": group_id }),
                )
                .await?;
            let config_id = response
                .get("result")
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_u64())
                .ok_or_else(|| IntegrationError::FieldReconciliation("missing configuration id".into()))?;

            let key = (project_code.to_string(), format!("{}:{}", group.name, config.name));
            mapping.configurations.insert(key, config_id);
            stats.with_project(project_code, |p| p.configurations.record_created());
        }
    }

    Ok(())
}
