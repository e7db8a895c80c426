//! Downloads attachments from TestRail and re-uploads them to Qase,
//! recording the resulting hash in `mapping.attachments_map` so case and
//! result bodies can rewrite their embedded references.
//!
//! Mirrors the reference importer's `check_and_replace_attachments` family:
//! download once, upload once, and on a transient upload failure retry the
//! single attachment (`replace_failover`) rather than failing the whole
//! batch.

use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::types::AttachmentRecord;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::qase::QaseClient;
use crate::testrail::TestrailClient;

const FAILOVER_ATTEMPTS: u32 = 2;

/// Ensure one attachment is present on the target, downloading and
/// re-uploading it if it hasn't been handled yet this run. Returns the
/// uploaded hash either way.
pub async fn ensure_attachment(
    testrail: &TestrailClient,
    qase: &QaseClient,
    project_code: &str,
    tr_attachment_id: u64,
    file_name: &str,
    mapping: &MappingStore,
    stats: &Stats,
) -> Result<String> {
    if let Some(existing) = mapping.attachment(tr_attachment_id) {
        return Ok(existing.qase_hash);
    }

    let bytes = testrail.download_attachment(tr_attachment_id).await?;

    let mut last_err = None;
    for attempt in 1..=FAILOVER_ATTEMPTS {
        match qase.upload_attachment(project_code, file_name, bytes.clone()).await {
            Ok(response) => {
                let hash = extract_hash(&response).unwrap_or_default();
                mapping.record_attachment(AttachmentRecord {
                    tr_attachment_id,
                    qase_hash: hash.clone(),
                    file_name: file_name.to_string(),
                });
                stats.attachments.record_created();
                return Ok(hash);
            }
            Err(e) => {
                warn!(attempt, tr_attachment_id, error = %e, "attachment upload failed, retrying");
                last_err = Some(e);
            }
        }
    }

    stats.attachments.record_failed();
    Err(last_err.expect("loop ran at least once"))
}

fn extract_hash(response: &Value) -> Option<String> {
    response
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("hash"))
        .and_then(|h| h.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_hash_from_upload_response() {
        let response = json!({ "result": [{ "hash": "abc123", "size": 10 }] });
        assert_eq!(extract_hash(&response), Some("abc123".to_string()));
    }

    #[test]
    fn missing_hash_returns_none() {
        assert_eq!(extract_hash(&json!({})), None);
    }
}
