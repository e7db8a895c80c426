use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `./railmigrate.toml`. Secrets
/// (API tokens) are read from environment variables rather than the file
/// itself, so a config file is safe to check into a repo.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub qase: QaseConfig,
    #[serde(default)]
    pub testrail: TestrailConfig,
    #[serde(default)]
    pub users: UsersConfig,
    #[serde(default)]
    pub tests: TestsConfig,
}

impl Config {
    /// Load from `./railmigrate.toml`, falling back to defaults (and thus
    /// to env-var-only credentials) when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Serialize config to TOML string. Token fields are never written back
    /// out here since they are meant to live in the environment, not the
    /// file; callers that round-trip a loaded config should re-blank them
    /// first if persisting to disk.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("QASE_API_TOKEN") {
            self.qase.api_token = token;
        }
        if let Ok(token) = std::env::var("TESTRAIL_API_TOKEN") {
            self.testrail.api_token = token;
        }
        if let Ok(user) = std::env::var("TESTRAIL_USERNAME") {
            self.testrail.username = user;
        }
    }

    fn default_path() -> PathBuf {
        PathBuf::from("./railmigrate.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaseConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_qase_base_url")]
    pub base_url: String,
    #[serde(default = "default_target_rpm")]
    pub requests_per_minute: u32,
}

impl Default for QaseConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: default_qase_base_url(),
            requests_per_minute: default_target_rpm(),
        }
    }
}

fn default_qase_base_url() -> String {
    "https://api.qase.io/v1".into()
}
fn default_target_rpm() -> u32 {
    // 230 requests per 10-second window, expressed per-minute for the
    // sleep-gate limiter.
    1_380
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestrailConfig {
    #[serde(default = "default_testrail_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_token: String,
}

impl Default for TestrailConfig {
    fn default() -> Self {
        Self {
            base_url: default_testrail_base_url(),
            username: String::new(),
            api_token: String::new(),
        }
    }
}

fn default_testrail_base_url() -> String {
    "https://example.testrail.io".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersConfig {
    /// When a TestRail user has no match in the target workspace, fall back
    /// to this Qase member id instead of failing the import.
    #[serde(default)]
    pub default_assignee_id: Option<u64>,
    /// Skip deactivated TestRail users entirely rather than creating
    /// placeholder Qase members for them.
    #[serde(default = "default_true")]
    pub skip_inactive: bool,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            default_assignee_id: None,
            skip_inactive: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestsConfig {
    /// Preserve TestRail ids on the target side when they fit in a signed
    /// 32-bit field; otherwise always hash, deterministically or not per
    /// this flag (see `core::mapping::safe_id`).
    #[serde(default = "default_true")]
    pub preserve_ids: bool,
    /// Cache downloaded attachments on disk between runs instead of
    /// re-fetching them from TestRail on every retry.
    #[serde(default)]
    pub cache_attachments: bool,
    #[serde(default)]
    pub refs: RefsConfig,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            preserve_ids: true,
            cache_attachments: false,
            refs: RefsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefsConfig {
    /// Turn the synthetic `Refs` field on. Mirrors the source's
    /// `tests.refs.enable` key.
    #[serde(default)]
    pub enable: bool,
    /// Base URL prepended to relative refs before they're rendered as
    /// markdown links. Mirrors the source's `tests.refs.url` key.
    #[serde(default)]
    pub url: Option<String>,
    /// Copy `SourceCase::refs` into a Qase custom field of this title,
    /// creating it if necessary. `None` drops refs on the floor.
    #[serde(default)]
    pub field_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = Config::default();
        assert!(cfg.tests.preserve_ids);
        assert!(cfg.users.skip_inactive);
        assert_eq!(cfg.qase.base_url, "https://api.qase.io/v1");
    }

    #[test]
    fn env_overrides_take_precedence() {
        std::env::set_var("QASE_API_TOKEN", "from-env");
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.qase.api_token, "from-env");
        std::env::remove_var("QASE_API_TOKEN");
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = Config::default();
        let text = cfg.to_toml().expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.qase.base_url, cfg.qase.base_url);
    }
}
