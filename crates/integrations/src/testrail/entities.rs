//! Typed fetches for each TestRail entity kind, built on top of
//! [`super::client::TestrailClient`]'s generic GET and pagination helpers.

use railmigrate_core::types::{
    FieldOption, FieldScope, SourceCase, SourceConfigGroup, SourceFieldDescriptor,
    SourceMilestone, SourceProject, SourceRun, SourceSharedStep, SourceSuite, SourceUser,
};
use serde_json::Value;

use super::client::{paginate_all, TestrailClient};
use crate::error::Result;

pub async fn get_users(client: &TestrailClient) -> Result<Vec<SourceUser>> {
    client.get("get_users").await
}

pub async fn get_projects(client: &TestrailClient) -> Result<Vec<SourceProject>> {
    let raw = paginate_all(client, "get_projects", "projects").await?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub async fn get_suites(client: &TestrailClient, project_id: u64) -> Result<Vec<SourceSuite>> {
    client.get(&format!("get_suites/{project_id}")).await
}

pub async fn get_milestones(
    client: &TestrailClient,
    project_id: u64,
) -> Result<Vec<SourceMilestone>> {
    let raw = paginate_all(
        client,
        &format!("get_milestones/{project_id}"),
        "milestones",
    )
    .await?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub async fn get_configs(client: &TestrailClient, project_id: u64) -> Result<Vec<SourceConfigGroup>> {
    client.get(&format!("get_configs/{project_id}")).await
}

pub async fn get_shared_steps(
    client: &TestrailClient,
    project_id: u64,
) -> Result<Vec<SourceSharedStep>> {
    let raw = paginate_all(
        client,
        &format!("get_shared_steps/{project_id}"),
        "shared_steps",
    )
    .await?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub async fn get_cases(
    client: &TestrailClient,
    project_id: u64,
    suite_id: u64,
) -> Result<Vec<SourceCase>> {
    let raw = paginate_all(
        client,
        &format!("get_cases/{project_id}&suite_id={suite_id}"),
        "cases",
    )
    .await?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub async fn get_runs(client: &TestrailClient, project_id: u64) -> Result<Vec<SourceRun>> {
    let raw = paginate_all(client, &format!("get_runs/{project_id}"), "runs").await?;
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

pub async fn get_tests(client: &TestrailClient, run_id: u64) -> Result<Vec<Value>> {
    paginate_all(client, &format!("get_tests/{run_id}"), "tests").await
}

pub async fn get_results_for_run(client: &TestrailClient, run_id: u64) -> Result<Vec<Value>> {
    paginate_all(client, &format!("get_results_for_run/{run_id}"), "results").await
}

/// A single TestRail attachment id listed against a case, run or result.
/// Discovered either via `get_attachments_for_case/{id}` or
/// `get_attachments_for_run/{id}`, sliding-window paginated and capped by
/// [`super::client::MAX_ATTACHMENT_ITEMS`].
pub async fn get_attachments_for_case(client: &TestrailClient, case_id: u64) -> Result<Vec<Value>> {
    paginate_all(
        client,
        &format!("get_attachments_for_case/{case_id}"),
        "attachments",
    )
    .await
}

pub async fn get_attachments_for_run(client: &TestrailClient, run_id: u64) -> Result<Vec<Value>> {
    paginate_all(
        client,
        &format!("get_attachments_for_run/{run_id}"),
        "attachments",
    )
    .await
}

/// Fetch case-level and result-level custom field descriptors and flatten
/// them into [`SourceFieldDescriptor`], resolving each field's scope from
/// its `configs`/`context` block.
pub async fn get_case_fields(client: &TestrailClient) -> Result<Vec<SourceFieldDescriptor>> {
    let raw: Vec<Value> = client.get("get_case_fields").await?;
    Ok(raw.iter().filter_map(parse_field_descriptor(true)).collect())
}

pub async fn get_result_fields(client: &TestrailClient) -> Result<Vec<SourceFieldDescriptor>> {
    let raw: Vec<Value> = client.get("get_result_fields").await?;
    Ok(raw
        .iter()
        .filter_map(parse_field_descriptor(false))
        .collect())
}

fn parse_field_descriptor(is_case_field: bool) -> impl Fn(&Value) -> Option<SourceFieldDescriptor> {
    move |raw: &Value| {
        let tr_id = raw.get("id")?.as_u64()? as u32;
        let system_name = raw.get("system_name")?.as_str()?.to_string();
        let label = raw.get("label")?.as_str().unwrap_or(&system_name).to_string();
        let tr_type = raw.get("type_id")?.as_u64()? as u32;

        let configs = raw.get("configs").and_then(|v| v.as_array());
        let scope = resolve_scope(configs);

        let options = raw
            .get("configs")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("options"))
            .and_then(|o| o.get("items"))
            .and_then(|v| v.as_str())
            .map(parse_enum_options)
            .unwrap_or_default();

        Some(SourceFieldDescriptor {
            tr_id,
            system_name,
            label,
            tr_type,
            scope,
            options,
            is_case_field,
        })
    }
}

fn resolve_scope(configs: Option<&Vec<Value>>) -> FieldScope {
    let Some(configs) = configs else {
        return FieldScope::Global;
    };

    let project_scoped: Vec<&Value> = configs
        .iter()
        .filter(|c| {
            c.get("context")
                .and_then(|ctx| ctx.get("is_global"))
                .and_then(|g| g.as_bool())
                != Some(true)
        })
        .collect();

    if project_scoped.is_empty() {
        return FieldScope::Global;
    }

    let names: Vec<String> = project_scoped
        .iter()
        .filter_map(|c| c.get("context")?.get("project_ids")?.as_array())
        .flatten()
        .filter_map(|v| v.as_u64())
        .map(|id| id.to_string())
        .collect();

    match names.len() {
        0 | 1 => FieldScope::SingleConfig(names.into_iter().next().unwrap_or_default()),
        _ => FieldScope::MultiConfig(names),
    }
}

/// TestRail enum fields store their options as a newline-separated
/// `"1, Low\n2, Medium\n3, High"` string.
fn parse_enum_options(raw: &str) -> Vec<FieldOption> {
    raw.lines()
        .filter_map(|line| {
            let (key, label) = line.split_once(',')?;
            Some(FieldOption {
                tr_key: key.trim().to_string(),
                label: label.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enum_options_from_newline_csv() {
        let opts = parse_enum_options("1, Low\n2, Medium\n3, High");
        assert_eq!(opts.len(), 3);
        assert_eq!(opts[2].label, "High");
        assert_eq!(opts[2].tr_key, "3");
    }
}
