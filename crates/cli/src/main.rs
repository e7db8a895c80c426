#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use clap::{Parser, Subcommand};

/// railmigrate -- migrate a TestRail instance into Qase.
#[derive(Parser)]
#[command(name = "railmigrate", version, about)]
struct Cli {
    /// Path to the config file (defaults to ./railmigrate.toml).
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration.
    Run {
        /// Restrict the run to these Qase project codes (repeatable).
        #[arg(short = 'p', long = "project")]
        projects: Vec<String>,
        /// Fetch and reconcile everything without writing anything to Qase.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Validate configuration and connectivity to TestRail and Qase.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { projects, dry_run } => {
            commands::run::run(config, projects, dry_run).await?;
        }
        Commands::Doctor => {
            commands::doctor::run(config).await?;
        }
    }

    Ok(())
}
