//! Domain types shared across the migration engine: source/target entity
//! shapes, the custom-field schema model, and the identifiers threaded
//! through the mapping store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest value that fits in a signed 32-bit integer. TestRail and Qase IDs
/// that exceed this must be hashed down before being sent as a numeric
/// field (see `core::mapping::safe_id`).
pub const MAX_SAFE_ID: i64 = 2_147_483_647;

/// Qase custom-field type codes, keyed by TestRail's own type code via
/// [`tr_type_to_qase_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum QaseFieldType {
    String = 1,
    Selectbox = 0,
    Multiselect = 2,
    Checkbox = 7,
    Text = 4,
    Url = 3,
    User = 8,
    Datetime = 9,
    Radio = 6,
}

/// Fixed TestRail-type-code -> Qase-type-code table
/// (`{1:1,2:0,3:2,4:7,5:4,6:3,7:8,8:9,12:6}`).
pub fn tr_type_to_qase_type(tr_type: u32) -> Option<QaseFieldType> {
    use QaseFieldType::*;
    Some(match tr_type {
        1 => String,
        2 => Selectbox,
        3 => Multiselect,
        4 => Checkbox,
        5 => Text,
        6 => Url,
        7 => User,
        8 => Datetime,
        12 => Radio,
        _ => return None,
    })
}

/// Strip the `custom_` prefix and then one of `case_`/`test_`/`tr_`, the
/// same two-stage strip both the field reconciler and the case importer use
/// to turn a raw `system_name`/custom-field key into the bare name used for
/// field lookups.
pub fn normalize_field_name(raw: &str) -> &str {
    let stripped = raw.strip_prefix("custom_").unwrap_or(raw);
    for prefix in ["case_", "test_", "tr_"] {
        if let Some(rest) = stripped.strip_prefix(prefix) {
            return rest;
        }
    }
    stripped
}

/// A single enum option on a select/multiselect/radio custom field, as
/// declared on the TestRail side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOption {
    pub tr_key: String,
    pub label: String,
}

/// Where a TestRail custom field is configured: every project (`Global`),
/// one named configuration (`SingleConfig`), or several
/// (`MultiConfig`, which fans out into one field per project).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldScope {
    Global,
    SingleConfig(String),
    MultiConfig(Vec<String>),
}

/// A TestRail custom field as read from `get_case_fields`/`get_result_fields`,
/// normalized enough to drive the Qase field reconciler.
#[derive(Debug, Clone)]
pub struct SourceFieldDescriptor {
    pub tr_id: u32,
    pub system_name: String,
    pub label: String,
    pub tr_type: u32,
    pub scope: FieldScope,
    pub options: Vec<FieldOption>,
    pub is_case_field: bool,
}

/// A Qase custom field as returned by `get_system_fields`/`get_case_custom_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaseFieldDescriptor {
    pub id: u64,
    pub title: String,
    #[serde(rename = "type")]
    pub field_type: u8,
    #[serde(default)]
    pub project_codes: Vec<String>,
    #[serde(default)]
    pub is_global: bool,
    /// Existing enum options (`select`/`multiselect`/`radio` only), as
    /// `{id, title}` pairs. Sometimes comes back from the API as a JSON
    /// string rather than an array; callers must parse it first.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One existing enum option on a Qase field, as parsed out of
/// [`QaseFieldDescriptor::value`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaseFieldOption {
    pub id: u64,
    pub title: String,
}

/// Parse a field's `value` into its option list, handling both the normal
/// JSON-array shape and the occasional JSON-string-encoded-array shape the
/// API returns for older fields.
pub fn parse_qase_field_options(value: &serde_json::Value) -> Vec<QaseFieldOption> {
    match value {
        serde_json::Value::String(s) => {
            serde_json::from_str(s).unwrap_or_default()
        }
        serde_json::Value::Array(_) => {
            serde_json::from_value(value.clone()).unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

/// Outcome of reconciling one source field against the target schema: either
/// it already exists and is reused, or a new global/per-project field (or
/// set of fields, for the multi-config case) must be created.
#[derive(Debug, Clone)]
pub enum FieldReconciliation {
    Reuse { qase_field_id: u64 },
    CreateGlobal,
    CreatePerProject { project_codes: Vec<String> },
}

/// An uploaded attachment, tracked by its TestRail attachment id so later
/// phases (cases, results) can resolve references without re-uploading.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    pub tr_attachment_id: u64,
    pub qase_hash: String,
    pub file_name: String,
}

/// A TestRail user, mapped to a Qase member by email.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceUser {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub is_active: bool,
}

/// A TestRail project, mapped 1:1 to a Qase project code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceProject {
    pub id: u64,
    pub name: String,
    pub suite_mode: u8,
}

/// A TestRail test suite.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSuite {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub description: Option<String>,
}

/// A TestRail milestone, optionally nested under a parent milestone.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceMilestone {
    pub id: u64,
    pub project_id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub description: Option<String>,
    pub due_on: Option<i64>,
    pub is_completed: bool,
}

/// A TestRail configuration group and its member configurations (e.g.
/// "Operating System" -> ["Windows", "macOS"]).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfigGroup {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub configs: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub id: u64,
    pub name: String,
}

/// A TestRail shared step template, referenced by test cases via
/// `custom_steps_separated`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSharedStep {
    pub id: u64,
    pub project_id: u64,
    pub title: String,
    pub custom_steps_separated: Vec<SourceStep>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceStep {
    pub content: String,
    pub expected: Option<String>,
}

/// A TestRail test case. Custom fields ride in `custom_fields` with their
/// raw JSON shape, resolved later by `core::fieldvalue`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceCase {
    pub id: u64,
    pub suite_id: u64,
    pub section_id: u64,
    pub title: String,
    pub priority_id: Option<u32>,
    pub type_id: Option<u32>,
    pub estimate: Option<String>,
    pub milestone_id: Option<u64>,
    pub refs: Option<String>,
    pub custom_steps_separated: Vec<SourceStep>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

/// A TestRail test run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceRun {
    pub id: u64,
    pub project_id: u64,
    pub suite_id: Option<u64>,
    pub milestone_id: Option<u64>,
    pub config_ids: Vec<u64>,
    pub name: String,
    pub is_completed: bool,
    pub case_ids: Vec<u64>,
}

/// A single result entry on a test run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceResult {
    pub id: u64,
    pub test_id: u64,
    pub case_id: u64,
    pub status_id: u32,
    pub assignedto_id: Option<u64>,
    pub comment: Option<String>,
    pub elapsed: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, serde_json::Value>,
}

/// TestRail status ids that every instance defines (1..=5), mapped to Qase's
/// equivalent system statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemResultStatus {
    Passed,
    Blocked,
    Untested,
    Retest,
    Failed,
}

pub fn default_status_map() -> HashMap<u32, SystemResultStatus> {
    use SystemResultStatus::*;
    HashMap::from([
        (1, Passed),
        (2, Blocked),
        (3, Untested),
        (4, Retest),
        (5, Failed),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_field_name_strips_custom_and_source_prefix() {
        assert_eq!(normalize_field_name("custom_case_severity"), "severity");
        assert_eq!(normalize_field_name("custom_test_severity"), "severity");
        assert_eq!(normalize_field_name("custom_tr_severity"), "severity");
        assert_eq!(normalize_field_name("custom_severity"), "severity");
        assert_eq!(normalize_field_name("severity"), "severity");
    }
}
