//! Custom field schema reconciliation: the hardest subsystem in the
//! migration. For every TestRail custom field, decide whether an
//! equivalent Qase field already exists (matched by title + type) or must
//! be created, and if created, whether it's global or must be split into
//! one field per project.
//!
//! Three rules, applied in order:
//! 1. Global field (every TestRail project uses it) -> one global Qase field.
//! 2. Field scoped to a single named TestRail configuration -> one Qase
//!    field, scoped to the one matching project.
//! 3. Field scoped to several TestRail configurations -> one Qase field per
//!    project the configurations cover ("multi-config" fan-out).
//!
//! For enum-typed fields (TestRail type 6 single-select, 12 multi-select)
//! reconciliation additionally builds `tr_key_to_qase_id`/`qase_values` in
//! the mapping store, appending any source option missing from an existing
//! target field and unioning in any project codes the source configuration
//! requires but the target doesn't yet carry.

use railmigrate_core::mapping::{CustomFieldMapping, FieldRegistryEntry, MappingStore};
use railmigrate_core::types::{
    normalize_field_name, parse_qase_field_options, tr_type_to_qase_type, FieldScope,
    QaseFieldDescriptor, QaseFieldOption, SourceFieldDescriptor,
};
use serde_json::json;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{IntegrationError, Result};
use crate::qase::QaseClient;

fn is_enum_type(tr_type: u32) -> bool {
    matches!(tr_type, 6 | 12)
}

fn title_type_match(title: &str, tr_type: u32, existing: &QaseFieldDescriptor) -> bool {
    let Some(qase_type) = tr_type_to_qase_type(tr_type) else {
        return false;
    };
    existing.title.eq_ignore_ascii_case(title) && existing.field_type == qase_type as u8
}

/// Title+type match table: a TestRail field reuses an existing Qase field
/// only when both the (case-insensitive) title and the mapped type agree.
fn matches_existing(source: &SourceFieldDescriptor, existing: &QaseFieldDescriptor) -> bool {
    title_type_match(&source.label, source.tr_type, existing)
}

pub async fn reconcile_fields(
    qase: &QaseClient,
    source_fields: &[SourceFieldDescriptor],
    project_codes: &[String],
    mapping: &mut MappingStore,
) -> Result<()> {
    let existing: Vec<QaseFieldDescriptor> = qase.get("/case/field").await?;

    for field in source_fields {
        let normalized = normalize_field_name(&field.system_name).to_string();

        // Step-container fields (type 10) are not Qase custom fields at
        // all; the importer turns their values into test steps directly.
        if field.tr_type == 10 {
            mapping.step_fields.insert(normalized);
            continue;
        }

        let Some(qase_type) = tr_type_to_qase_type(field.tr_type) else {
            warn!(tr_id = field.tr_id, tr_type = field.tr_type, "unsupported field type, skipping");
            continue;
        };

        match &field.scope {
            FieldScope::Global => {
                let id = reconcile_one(
                    qase,
                    field,
                    qase_type as u8,
                    &field.label,
                    None,
                    &existing,
                    mapping,
                )
                .await?;
                mapping.custom_fields.insert(field.tr_id, CustomFieldMapping::Global(id));
                mapping.field_registry.insert(
                    normalized,
                    FieldRegistryEntry { tr_id: field.tr_id, tr_type: field.tr_type, qase_field_id: id },
                );
            }
            FieldScope::SingleConfig(config_name) => {
                let project_code = resolve_project_for_config(config_name, project_codes);
                let id = reconcile_one(
                    qase,
                    field,
                    qase_type as u8,
                    &field.label,
                    Some(std::slice::from_ref(&project_code)),
                    &existing,
                    mapping,
                )
                .await?;
                mapping.field_registry.insert(
                    format!("{normalized}_{project_code}"),
                    FieldRegistryEntry { tr_id: field.tr_id, tr_type: field.tr_type, qase_field_id: id },
                );
                let mut per_project = HashMap::new();
                per_project.insert(project_code, id);
                mapping
                    .custom_fields
                    .insert(field.tr_id, CustomFieldMapping::PerProject(per_project));
            }
            FieldScope::MultiConfig(config_names) => {
                let mut per_project = HashMap::new();
                for config_name in config_names {
                    let project_code = resolve_project_for_config(config_name, project_codes);
                    let title = format!("{} {}", field.label, project_code);
                    let id = reconcile_one(
                        qase,
                        field,
                        qase_type as u8,
                        &title,
                        Some(std::slice::from_ref(&project_code)),
                        &existing,
                        mapping,
                    )
                    .await?;
                    mapping.field_registry.insert(
                        format!("{normalized}_{project_code}"),
                        FieldRegistryEntry { tr_id: field.tr_id, tr_type: field.tr_type, qase_field_id: id },
                    );
                    per_project.insert(project_code, id);
                }
                mapping
                    .custom_fields
                    .insert(field.tr_id, CustomFieldMapping::PerProject(per_project));
            }
        }
    }

    Ok(())
}

/// Reconcile one (title, scope) combination against the existing target
/// schema: reuse-and-diff if a matching field already exists, otherwise
/// create it. Returns the target field id.
async fn reconcile_one(
    qase: &QaseClient,
    field: &SourceFieldDescriptor,
    qase_type: u8,
    title: &str,
    project_codes: Option<&[String]>,
    existing: &[QaseFieldDescriptor],
    mapping: &mut MappingStore,
) -> Result<u64> {
    if let Some(reused) = existing
        .iter()
        .find(|e| title_type_match(title, field.tr_type, e))
    {
        info!(tr_id = field.tr_id, qase_id = reused.id, title, "reusing existing custom field");
        if is_enum_type(field.tr_type) {
            diff_and_update_enum_field(qase, field, reused, project_codes, mapping).await?;
        } else if let Some(required) = project_codes {
            maybe_union_project_codes(qase, reused, required).await?;
        }
        return Ok(reused.id);
    }

    match project_codes {
        None => create_global_field(qase, field, qase_type, mapping).await,
        Some(codes) => create_scoped_field(qase, field, qase_type, codes, mapping).await,
    }
}

/// Diff a reused enum field against the source's option list: append any
/// source option missing from the target (ids assigned from the current
/// max+1), union in any project codes the source configuration requires,
/// and push a full-replacement update when either changed. Always populates
/// `tr_key_to_qase_id`/`qase_values` for the field, even when no update call
/// is needed.
async fn diff_and_update_enum_field(
    qase: &QaseClient,
    field: &SourceFieldDescriptor,
    existing: &QaseFieldDescriptor,
    project_codes: Option<&[String]>,
    mapping: &mut MappingStore,
) -> Result<()> {
    let mut options = parse_qase_field_options(&existing.value);
    let by_label: HashMap<String, u64> = options
        .iter()
        .map(|o| (o.title.trim().to_string(), o.id))
        .collect();
    let mut max_id = options.iter().map(|o| o.id).max().unwrap_or(0);

    let mut tr_map = HashMap::new();
    let mut appended = Vec::new();
    for option in &field.options {
        let label = option.label.trim();
        let target_id = match by_label.get(label) {
            Some(id) => *id,
            None => {
                max_id += 1;
                appended.push(QaseFieldOption {
                    id: max_id,
                    title: label.to_string(),
                });
                max_id
            }
        };
        tr_map.insert(option.tr_key.clone(), target_id);
    }

    options.extend(appended.iter().cloned());

    let union_codes = if existing.is_global {
        None
    } else {
        project_codes.map(|required| {
            let mut codes = existing.project_codes.clone();
            for code in required {
                if !codes.iter().any(|c| c == code) {
                    codes.push(code.clone());
                }
            }
            codes
        })
    };
    let codes_changed = union_codes
        .as_ref()
        .is_some_and(|codes| codes.len() != existing.project_codes.len());

    if !appended.is_empty() || codes_changed {
        let mut payload = json!({
            "title": existing.title,
            "type": existing.field_type,
            "value": options,
        });
        if let Some(codes) = &union_codes {
            payload["projects_codes"] = json!(codes);
        }
        let _: serde_json::Value = qase
            .patch(&format!("/case/field/{}", existing.id), &payload)
            .await?;
    }

    let qase_values: HashMap<u64, String> =
        options.into_iter().map(|o| (o.id, o.title)).collect();
    mapping
        .qase_values
        .entry(field.tr_id)
        .or_default()
        .extend(qase_values);
    mapping
        .tr_key_to_qase_id
        .entry(field.tr_id)
        .or_default()
        .extend(tr_map);

    Ok(())
}

/// Non-enum reused field whose source configuration requires project codes
/// the target doesn't carry yet: union and update, preserving identity
/// fields per the target's full-replacement update contract.
async fn maybe_union_project_codes(
    qase: &QaseClient,
    existing: &QaseFieldDescriptor,
    required: &[String],
) -> Result<()> {
    if existing.is_global {
        return Ok(());
    }
    let mut codes = existing.project_codes.clone();
    let mut changed = false;
    for code in required {
        if !codes.iter().any(|c| c == code) {
            codes.push(code.clone());
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }
    let payload = json!({
        "title": existing.title,
        "type": existing.field_type,
        "projects_codes": codes,
    });
    let _: serde_json::Value = qase
        .patch(&format!("/case/field/{}", existing.id), &payload)
        .await?;
    Ok(())
}

/// A TestRail configuration name doesn't always match a project code
/// one-to-one; fall back to the configuration name itself (truncated the
/// same way project codes are derived) when no exact project is found.
fn resolve_project_for_config(config_name: &str, project_codes: &[String]) -> String {
    project_codes
        .iter()
        .find(|code| code.eq_ignore_ascii_case(config_name))
        .cloned()
        .unwrap_or_else(|| crate::importers::projects::derive_project_code(config_name))
}

async fn create_global_field(
    qase: &QaseClient,
    field: &SourceFieldDescriptor,
    qase_type: u8,
    mapping: &mut MappingStore,
) -> Result<u64> {
    let options = enum_options_payload(field);
    let response: serde_json::Value = qase
        .post(
            "/case/field",
            &json!({
                "title": field.label,
                "type": qase_type,
                "is_filterable": true,
                "value": options,
            }),
        )
        .await?;
    let id = extract_created_id(&response)?;
    record_fresh_enum_mapping(field, &options, mapping);
    Ok(id)
}

async fn create_scoped_field(
    qase: &QaseClient,
    field: &SourceFieldDescriptor,
    qase_type: u8,
    project_codes: &[String],
    mapping: &mut MappingStore,
) -> Result<u64> {
    let options = enum_options_payload(field);
    let response: serde_json::Value = qase
        .post(
            "/case/field",
            &json!({
                "title": field.label,
                "type": qase_type,
                "is_filterable": true,
                "value": options,
                "projects_codes": project_codes,
            }),
        )
        .await?;
    let id = extract_created_id(&response)?;
    record_fresh_enum_mapping(field, &options, mapping);
    Ok(id)
}

/// Serialize a select/multiselect/radio field's options, assigning
/// sequential ids starting at 1 (the `target_value_id` space is private to
/// this freshly-created field).
fn enum_options_payload(field: &SourceFieldDescriptor) -> Vec<QaseFieldOption> {
    field
        .options
        .iter()
        .enumerate()
        .map(|(idx, option)| QaseFieldOption {
            id: (idx + 1) as u64,
            title: option.label.trim().to_string(),
        })
        .collect()
}

/// Populate `tr_key_to_qase_id`/`qase_values` for a field just created with
/// the given sequential option ids.
fn record_fresh_enum_mapping(
    field: &SourceFieldDescriptor,
    options: &[QaseFieldOption],
    mapping: &mut MappingStore,
) {
    if !is_enum_type(field.tr_type) || field.options.is_empty() {
        return;
    }
    let by_label: HashMap<&str, u64> = options.iter().map(|o| (o.title.as_str(), o.id)).collect();
    let mut tr_map = HashMap::new();
    for option in &field.options {
        match by_label.get(option.label.trim()) {
            Some(id) => {
                tr_map.insert(option.tr_key.clone(), *id);
            }
            None => warn!(
                tr_id = field.tr_id,
                tr_key = option.tr_key,
                "source option has no matching freshly-created target value"
            ),
        }
    }
    mapping
        .qase_values
        .entry(field.tr_id)
        .or_default()
        .extend(options.iter().map(|o| (o.id, o.title.clone())));
    mapping
        .tr_key_to_qase_id
        .entry(field.tr_id)
        .or_default()
        .extend(tr_map);
}

fn extract_created_id(response: &serde_json::Value) -> Result<u64> {
    response
        .get("result")
        .and_then(|r| r.get("id"))
        .and_then(|id| id.as_u64())
        .ok_or_else(|| IntegrationError::FieldReconciliation("create response missing id".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use railmigrate_core::types::FieldOption;

    fn field(label: &str, tr_type: u32, scope: FieldScope) -> SourceFieldDescriptor {
        SourceFieldDescriptor {
            tr_id: 1,
            system_name: "custom_field".into(),
            label: label.into(),
            tr_type,
            scope,
            options: vec![],
            is_case_field: true,
        }
    }

    #[test]
    fn matches_existing_by_title_and_type_case_insensitively() {
        let source = field("Severity", 2, FieldScope::Global);
        let existing = QaseFieldDescriptor {
            id: 10,
            title: "severity".into(),
            field_type: 0,
            project_codes: vec![],
            is_global: true,
            value: serde_json::Value::Null,
        };
        assert!(matches_existing(&source, &existing));
    }

    #[test]
    fn does_not_match_on_type_mismatch() {
        let source = field("Severity", 2, FieldScope::Global);
        let existing = QaseFieldDescriptor {
            id: 10,
            title: "Severity".into(),
            field_type: 4,
            project_codes: vec![],
            is_global: true,
            value: serde_json::Value::Null,
        };
        assert!(!matches_existing(&source, &existing));
    }

    #[test]
    fn enum_options_payload_assigns_sequential_ids_without_priority_hint() {
        let mut f = field("Priority", 6, FieldScope::Global);
        f.options = vec![
            FieldOption { tr_key: "1".into(), label: "Low".into() },
            FieldOption { tr_key: "2".into(), label: "High".into() },
        ];
        let payload = enum_options_payload(&f);
        assert_eq!(payload[0].id, 1);
        assert_eq!(payload[1].id, 2);
        assert_eq!(payload[1].title, "High");
        let as_json = serde_json::to_value(&payload[1]).unwrap();
        assert!(as_json.get("default_priority_hint").is_none());
    }

    #[test]
    fn resolve_project_for_config_falls_back_to_derived_code() {
        let codes = vec!["DEMO".to_string()];
        assert_eq!(resolve_project_for_config("demo", &codes), "DEMO");
        assert_eq!(resolve_project_for_config("Other Config", &codes), "OTHERCONFIG");
    }

    #[test]
    fn record_fresh_enum_mapping_builds_tr_key_to_qase_id() {
        let mut f = field("Priority", 6, FieldScope::Global);
        f.options = vec![
            FieldOption { tr_key: "1".into(), label: "Low".into() },
            FieldOption { tr_key: "2".into(), label: "High".into() },
        ];
        let options = enum_options_payload(&f);
        let mut mapping = MappingStore::new();
        record_fresh_enum_mapping(&f, &options, &mut mapping);
        assert_eq!(mapping.enum_value_id(f.tr_id, "1"), Some(1));
        assert_eq!(mapping.enum_value_id(f.tr_id, "2"), Some(2));
    }
}
