//! Creates (or reuses) one Qase project per TestRail project, and populates
//! `mapping.project_map` so every later phase can resolve a project code
//! from a TestRail project id.

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::types::SourceProject;
use serde_json::{json, Value};
use tracing::info;

use crate::qase::QaseClient;

/// Derive a short, Qase-legal project code from a TestRail project name:
/// uppercase alphanumerics only, truncated to 10 characters.
pub fn derive_project_code(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();
    cleaned.chars().take(10).collect()
}

pub async fn import_projects(
    qase: &QaseClient,
    projects: &[SourceProject],
    mapping: &mut MappingStore,
    stats: &Stats,
) -> crate::error::Result<()> {
    let existing: Vec<Value> = qase.get("/project").await?;
    let existing_codes: std::collections::HashSet<String> = existing
        .iter()
        .filter_map(|p| p.get("code")?.as_str().map(str::to_string))
        .collect();

    for project in projects {
        let mut code = derive_project_code(&project.name);
        if code.is_empty() {
            code = format!("P{}", project.id);
        }

        if existing_codes.contains(&code) {
            info!(code, "project already exists, reusing");
            stats.projects.record_skipped();
        } else {
            qase.post::<_, Value>(
                "/project",
                &json!({ "title": project.name, "code": code }),
            )
            .await?;
            stats.projects.record_created();
        }

        mapping.project_map.insert(project.id, code);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_uppercase_alnum_code() {
        assert_eq!(derive_project_code("Demo Project!"), "DEMOPROJECT");
    }

    #[test]
    fn truncates_to_ten_characters() {
        assert_eq!(derive_project_code("SuperLongProjectName"), "SUPERLONGP");
    }
}
