use railmigrate_core::config::Config;
use railmigrate_integrations::qase::QaseClient;
use railmigrate_integrations::testrail::{entities, TestrailClient};

/// Validate configuration shape and reachability of both endpoints without
/// migrating anything. Exits with an error (non-zero status) if any check
/// fails, after printing every check's result.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let mut ok = true;

    match TestrailClient::new(&config.testrail) {
        Ok(client) => {
            println!("[ok]   testrail credentials configured");
            match entities::get_users(&client).await {
                Ok(users) => println!("[ok]   testrail reachable ({} users)", users.len()),
                Err(e) => {
                    println!("[fail] testrail request failed: {e}");
                    ok = false;
                }
            }
        }
        Err(e) => {
            println!("[fail] testrail credentials: {e}");
            ok = false;
        }
    }

    match QaseClient::new(&config.qase) {
        Ok(client) => {
            println!("[ok]   qase credentials configured");
            match client.get::<serde_json::Value>("/project").await {
                Ok(_) => println!("[ok]   qase reachable"),
                Err(e) => {
                    println!("[fail] qase request failed: {e}");
                    ok = false;
                }
            }
        }
        Err(e) => {
            println!("[fail] qase credentials: {e}");
            ok = false;
        }
    }

    if config.users.default_assignee_id.is_none() {
        println!("[warn] no users.default_assignee_id configured; unmatched TestRail users will be recorded as failed rather than reassigned");
    }

    if !ok {
        anyhow::bail!("one or more checks failed");
    }

    Ok(())
}
