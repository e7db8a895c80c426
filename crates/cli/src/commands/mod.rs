pub mod doctor;
pub mod run;

use railmigrate_core::config::Config;

/// Load configuration from an explicit path if given, otherwise from the
/// default `./railmigrate.toml` (falling back to defaults plus env-var
/// overrides when no file is present).
pub fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}
