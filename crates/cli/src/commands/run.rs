use railmigrate_core::config::Config;
use railmigrate_daemon::orchestrator::{MigrationOrchestrator, RunOptions};
use tracing::info;

pub async fn run(config: Config, projects: Vec<String>, dry_run: bool) -> anyhow::Result<()> {
    let orchestrator = MigrationOrchestrator::new(config)?;
    let options = RunOptions {
        project_codes: if projects.is_empty() { None } else { Some(projects) },
        dry_run,
    };

    info!(dry_run, "starting migration");
    let stats = orchestrator.run(&options).await?;
    println!("{}", stats.render_report());

    Ok(())
}
