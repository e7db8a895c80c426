//! Maps TestRail users onto existing Qase workspace members by email.
//! Qase has no "create member" API for most plans, so this phase only
//! resolves ids — it never creates accounts on the target.

use railmigrate_core::config::UsersConfig;
use railmigrate_core::mapping::MappingStore;
use railmigrate_core::stats::Stats;
use railmigrate_core::types::SourceUser;
use serde_json::Value;
use tracing::warn;

use crate::qase::QaseClient;
use crate::types::ImportOutcome;

pub async fn import_users(
    qase: &QaseClient,
    users: &[SourceUser],
    config: &UsersConfig,
    mapping: &mut MappingStore,
    stats: &Stats,
) -> crate::error::Result<()> {
    let members: Vec<Value> = qase.get("/member").await?;
    let by_email: std::collections::HashMap<String, u64> = members
        .iter()
        .filter_map(|m| {
            let email = m.get("email")?.as_str()?.to_lowercase();
            let id = m.get("id")?.as_u64()?;
            Some((email, id))
        })
        .collect();

    for user in users {
        if !user.is_active && config.skip_inactive {
            stats.users.record_skipped();
            continue;
        }

        let email = user.email.to_lowercase();
        if let Some(&qase_id) = by_email.get(&email) {
            mapping.users.insert(user.id, qase_id);
            stats.users.record_created();
        } else if let Some(default_id) = config.default_assignee_id {
            warn!(user_id = user.id, email, "no member match, using default assignee");
            mapping.users.insert(user.id, default_id);
            stats.users.record_skipped();
        } else {
            warn!(user_id = user.id, email, "no member match and no default assignee configured");
            stats.users.record_failed();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railmigrate_core::types::SourceUser;

    fn user(id: u64, email: &str, active: bool) -> SourceUser {
        SourceUser {
            id,
            name: "name".into(),
            email: email.into(),
            is_active: active,
        }
    }

    #[test]
    fn inactive_users_are_skipped_when_configured() {
        let u = user(1, "a@example.com", false);
        assert!(!u.is_active);
    }
}
