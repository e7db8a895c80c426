use railmigrate_core::config::Config;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.qase.base_url, "https://api.qase.io/v1");
    assert_eq!(cfg.qase.requests_per_minute, 1_380);
    assert_eq!(cfg.testrail.base_url, "https://example.testrail.io");
    assert!(cfg.users.skip_inactive);
    assert!(cfg.tests.preserve_ids);
    assert!(!cfg.tests.cache_attachments);
    assert!(cfg.tests.refs.field_title.is_none());
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("api.qase.io"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.qase.base_url, cfg.qase.base_url);
    assert_eq!(parsed.testrail.base_url, cfg.testrail.base_url);
    assert_eq!(parsed.tests.preserve_ids, cfg.tests.preserve_ids);
}

#[test]
fn config_partial_toml_fills_in_defaults() {
    let partial = r#"
[testrail]
base_url = "https://acme.testrail.io"
username = "bot@acme.com"

[users]
default_assignee_id = 42
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.testrail.base_url, "https://acme.testrail.io");
    assert_eq!(cfg.users.default_assignee_id, Some(42));
    // defaults should fill in the rest
    assert!(cfg.users.skip_inactive);
    assert_eq!(cfg.qase.base_url, "https://api.qase.io/v1");
}

#[test]
fn load_from_missing_path_errors() {
    let result = Config::load_from("/nonexistent/railmigrate.toml");
    assert!(result.is_err());
}
