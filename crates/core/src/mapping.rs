//! The mapping store: the in-memory dictionaries that carry source-id ->
//! target-id associations across migration phases. One struct instance is
//! threaded through the whole run; each phase writes its own section and
//! every later phase reads it.

use crate::types::{AttachmentRecord, MAX_SAFE_ID};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reduce a source id that would overflow a signed 32-bit field to a value
/// that fits, by hashing its decimal representation with MD5 and folding the
/// first 8 hex digits of the digest into range.
///
/// `preserve_ids = true` hashes the id alone, so the same source id always
/// maps to the same safe id across runs (needed for idempotent re-imports),
/// and ids already within range pass through unchanged.
/// `preserve_ids = false` ignores the source id entirely and derives the
/// result from the current time in milliseconds, so repeated runs never
/// collide on a previously-used id even when that id was already safe.
pub fn safe_id(id: i64, preserve_ids: bool) -> i64 {
    if !preserve_ids {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        return (now_ms as u64 % MAX_SAFE_ID as u64) as i64;
    }
    if id <= MAX_SAFE_ID {
        return id;
    }
    let digest = Md5::digest(id.to_string().as_bytes());
    let prefix = u32::from_be_bytes(
        digest[0..4]
            .try_into()
            .expect("md5 digest is always 16 bytes"),
    );
    (prefix as u64 % MAX_SAFE_ID as u64) as i64
}

/// Project-scoped key used for configuration and shared-step lookups, which
/// TestRail identifies by human-readable code rather than numeric id.
pub type ConfigKey = (String, String);

/// The mapping store. Each field is written by exactly one phase and read
/// by every phase that follows it; `attachments_map` is the one exception,
/// since attachment failover (re-uploading a missing file) can happen
/// during the case or result phase, so it is guarded by a mutex.
#[derive(Debug, Default)]
pub struct MappingStore {
    /// TestRail project id -> Qase project code.
    pub project_map: HashMap<u64, String>,
    /// TestRail user id -> Qase member id.
    pub users: HashMap<u64, u64>,
    /// (project_code, suite name) -> Qase suite id.
    pub suites: HashMap<ConfigKey, u64>,
    /// (project_code, milestone name) -> Qase milestone id.
    pub milestones: HashMap<ConfigKey, u64>,
    /// (project_code, "group:config") -> Qase configuration id.
    pub configurations: HashMap<ConfigKey, u64>,
    /// (project_code, shared step title) -> Qase shared step hash.
    pub shared_steps: HashMap<ConfigKey, String>,
    /// TestRail attachment id -> uploaded record, behind a mutex because
    /// failover re-uploads can race across case and result importers.
    pub attachments_map: Mutex<HashMap<u64, AttachmentRecord>>,
    /// TestRail custom field id -> Qase custom field id (global fields) or
    /// one id per project code (multi-config fields).
    pub custom_fields: HashMap<u32, CustomFieldMapping>,
    /// TestRail custom field id -> `target_value_id -> label`, for enum-typed
    /// fields: the reconciled option list on the Qase side.
    pub qase_values: HashMap<u32, HashMap<u64, String>>,
    /// TestRail custom field id -> `source_enum_key -> target_value_id`, for
    /// enum-typed fields: translates a case's raw TestRail option key into
    /// the matching Qase enum value id.
    pub tr_key_to_qase_id: HashMap<u32, HashMap<String, u64>>,
    /// Normalized field name (see `core::types::normalize_field_name`), or
    /// `<name>_<project code>` for a scoped field, -> the reconciled field's
    /// identity. Built by the reconciler, read by the case importer to
    /// dispatch a raw `custom_*` key to the right target field and type.
    pub field_registry: HashMap<String, FieldRegistryEntry>,
    /// TestRail case id -> Qase case id, plus whether the id was hashed.
    pub case_id_mapping: HashMap<u64, CaseIdEntry>,
    pub priorities: HashMap<u32, u64>,
    pub case_types: HashMap<u32, u64>,
    pub result_statuses: HashMap<u32, u64>,
    pub case_statuses: HashMap<u32, u64>,
    /// Normalized names of source step-container fields (TestRail type 10):
    /// these carry structured `{content, expected, additional_info}` step
    /// data rather than a scalar custom-field value.
    pub step_fields: std::collections::HashSet<String>,
    /// Qase system field id used to store `SourceCase::refs`.
    pub refs_field_id: Option<u64>,
    /// Qase system field id used to store the original TestRail case id,
    /// for traceability after migration.
    pub testrail_original_id_field_id: Option<u64>,
    /// Qase system field id used to store `SourceCase::estimate`.
    pub estimate_field_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum CustomFieldMapping {
    Global(u64),
    PerProject(HashMap<String, u64>),
}

/// One reconciled custom field, as looked up by the case importer via
/// `MappingStore::field_registry`.
#[derive(Debug, Clone, Copy)]
pub struct FieldRegistryEntry {
    pub tr_id: u32,
    pub tr_type: u32,
    pub qase_field_id: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CaseIdEntry {
    pub qase_id: i64,
    pub was_hashed: bool,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attachment(&self, record: AttachmentRecord) {
        let mut guard = self.attachments_map.lock().expect("attachments_map poisoned");
        guard.insert(record.tr_attachment_id, record);
    }

    pub fn attachment(&self, tr_attachment_id: u64) -> Option<AttachmentRecord> {
        let guard = self.attachments_map.lock().expect("attachments_map poisoned");
        guard.get(&tr_attachment_id).cloned()
    }

    pub fn record_case_id(&mut self, tr_case_id: u64, preserve_ids: bool) -> i64 {
        let raw = tr_case_id as i64;
        let qase_id = safe_id(raw, preserve_ids);
        self.case_id_mapping.insert(
            tr_case_id,
            CaseIdEntry {
                qase_id,
                was_hashed: qase_id != raw,
            },
        );
        qase_id
    }

    pub fn custom_field_for_project(&self, tr_field_id: u32, project_code: &str) -> Option<u64> {
        match self.custom_fields.get(&tr_field_id)? {
            CustomFieldMapping::Global(id) => Some(*id),
            CustomFieldMapping::PerProject(map) => map.get(project_code).copied(),
        }
    }

    /// Resolve a normalized custom-field name to its reconciled entry,
    /// checking the project-scoped key first and falling back to the bare
    /// name (see spec.md §4.5: `<name>_<project code>`, then `<name>`).
    pub fn resolve_field(&self, normalized_name: &str, project_code: &str) -> Option<&FieldRegistryEntry> {
        let scoped = format!("{normalized_name}_{project_code}");
        self.field_registry
            .get(&scoped)
            .or_else(|| self.field_registry.get(normalized_name))
    }

    /// Translate a source enum option key into the reconciled Qase value id
    /// for the given field. `None` when no reconciliation has run for this
    /// field, or the key has no match.
    pub fn enum_value_id(&self, tr_field_id: u32, source_key: &str) -> Option<u64> {
        self.tr_key_to_qase_id
            .get(&tr_field_id)
            .and_then(|m| m.get(source_key))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_id_passes_through_small_values() {
        assert_eq!(safe_id(42, true), 42);
        assert_eq!(safe_id(MAX_SAFE_ID, true), MAX_SAFE_ID);
    }

    #[test]
    fn safe_id_hashes_overflowing_values_deterministically() {
        let big = MAX_SAFE_ID + 1000;
        let first = safe_id(big, true);
        let second = safe_id(big, true);
        assert_eq!(first, second);
        assert!(first <= MAX_SAFE_ID);
    }

    #[test]
    fn safe_id_matches_md5_hex_prefix_formula() {
        let big = MAX_SAFE_ID + 1000;
        let digest = Md5::digest(big.to_string().as_bytes());
        let prefix = u32::from_be_bytes(digest[0..4].try_into().unwrap());
        let expected = (prefix as u64 % MAX_SAFE_ID as u64) as i64;
        assert_eq!(safe_id(big, true), expected);
    }

    #[test]
    fn safe_id_ignores_preserve_ids_false_even_for_safe_range_values() {
        let small = 42;
        let result = safe_id(small, false);
        assert_ne!(result, small);
        assert!(result <= MAX_SAFE_ID);
        assert!(result >= 0);
    }

    #[test]
    fn record_case_id_flags_hashed_ids() {
        let mut store = MappingStore::new();
        let small_qase_id = store.record_case_id(100, true);
        assert_eq!(small_qase_id, 100);
        assert!(!store.case_id_mapping[&100].was_hashed);

        let big_source_id = (MAX_SAFE_ID + 1) as u64;
        let big_qase_id = store.record_case_id(big_source_id, true);
        assert!(big_qase_id <= MAX_SAFE_ID);
        assert!(store.case_id_mapping[&big_source_id].was_hashed);
    }

    #[test]
    fn attachment_roundtrip_through_mutex() {
        let store = MappingStore::new();
        store.record_attachment(AttachmentRecord {
            tr_attachment_id: 7,
            qase_hash: "abc123".into(),
            file_name: "screenshot.png".into(),
        });
        let found = store.attachment(7).expect("attachment present");
        assert_eq!(found.qase_hash, "abc123");
        assert!(store.attachment(8).is_none());
    }

    #[test]
    fn custom_field_lookup_handles_global_and_per_project() {
        let mut store = MappingStore::new();
        store.custom_fields.insert(1, CustomFieldMapping::Global(99));
        store.custom_fields.insert(
            2,
            CustomFieldMapping::PerProject(HashMap::from([("DEMO".to_string(), 55)])),
        );
        assert_eq!(store.custom_field_for_project(1, "ANYTHING"), Some(99));
        assert_eq!(store.custom_field_for_project(2, "DEMO"), Some(55));
        assert_eq!(store.custom_field_for_project(2, "OTHER"), None);
    }

    #[test]
    fn resolve_field_prefers_project_scoped_key() {
        let mut store = MappingStore::new();
        store.field_registry.insert(
            "severity".to_string(),
            FieldRegistryEntry { tr_id: 1, tr_type: 6, qase_field_id: 10 },
        );
        store.field_registry.insert(
            "severity_DEMO".to_string(),
            FieldRegistryEntry { tr_id: 1, tr_type: 6, qase_field_id: 20 },
        );
        assert_eq!(store.resolve_field("severity", "DEMO").unwrap().qase_field_id, 20);
        assert_eq!(store.resolve_field("severity", "OTHER").unwrap().qase_field_id, 10);
        assert!(store.resolve_field("missing", "DEMO").is_none());
    }

    #[test]
    fn enum_value_id_translates_source_key() {
        let mut store = MappingStore::new();
        store
            .tr_key_to_qase_id
            .insert(1, HashMap::from([("1".to_string(), 7), ("2".to_string(), 8)]));
        assert_eq!(store.enum_value_id(1, "1"), Some(7));
        assert_eq!(store.enum_value_id(1, "2"), Some(8));
        assert_eq!(store.enum_value_id(1, "3"), None);
        assert_eq!(store.enum_value_id(2, "1"), None);
    }
}
