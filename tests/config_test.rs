//! Integration tests for configuration loading

use sanctions_screen::infra::{Config, SourceKind};
use sanctions_screen::services::VerdictPolicy;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[store]
path = "/var/lib/sanctions/lists.json"

[screening]
verdict_policy = "require_dob"

[refresh]
interval_secs = 3600

[[sources]]
kind = "file"
location = "/srv/staged/lists.json"

[[sources]]
kind = "http"
location = "https://lists.example.org/normalized.json"
timeout_ms = 5000

[api]
bind_address = "127.0.0.1"
port = 9090

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.store_path(), Path::new("/var/lib/sanctions/lists.json"));
    assert_eq!(config.verdict_policy(), VerdictPolicy::RequireDob);
    assert_eq!(config.refresh_interval_secs(), 3600);
    assert_eq!(config.sources().len(), 2);
    assert_eq!(config.sources()[0].kind, SourceKind::File);
    assert_eq!(config.sources()[0].timeout_ms, 30_000);
    assert_eq!(config.sources()[1].kind, SourceKind::Http);
    assert_eq!(config.sources()[1].timeout_ms, 5000);
    assert_eq!(config.api_bind_address(), "127.0.0.1");
    assert_eq!(config.api_port(), 9090);
    assert_eq!(config.metrics_interval_secs(), 15);
}

#[test]
fn test_partial_config_uses_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[store]\npath = \"lists.json\"\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.store_path(), Path::new("lists.json"));
    assert_eq!(config.verdict_policy(), VerdictPolicy::NameOnly);
    assert!(config.sources().is_empty());
    assert_eq!(config.api_port(), 8080);
}

#[test]
fn test_unknown_policy_is_rejected() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[screening]\nverdict_policy = \"fuzzy\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.store_path(), Path::new("data/sanctions.json"));
    assert_eq!(config.verdict_policy(), VerdictPolicy::NameOnly);
    assert_eq!(config.config_file(), "default");
}
