//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! The store path can be overridden with SANCTIONS_STORE_PATH.

use crate::services::name_matcher::VerdictPolicy;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding `store.path`
pub const STORE_PATH_ENV: &str = "SANCTIONS_STORE_PATH";

const DEFAULT_STORE_PATH: &str = "data/sanctions.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Http,
}

/// One upstream provider of normalized list data
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// File path or URL depending on `kind`
    pub location: String,
    /// Request timeout for http sources
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_source_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

fn default_store_path() -> String {
    DEFAULT_STORE_PATH.to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScreeningConfig {
    #[serde(default)]
    pub verdict_policy: VerdictPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between scheduled refreshes in serve mode (0 disables)
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: default_refresh_interval() }
    }
}

fn default_refresh_interval() -> u64 {
    86_400
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: default_api_bind_address(), port: default_api_port() }
    }
}

fn default_api_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    store_path: PathBuf,
    verdict_policy: VerdictPolicy,
    refresh_interval_secs: u64,
    sources: Vec<SourceConfig>,
    api_bind_address: String,
    api_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            store_path: PathBuf::from(toml_config.store.path),
            verdict_policy: toml_config.screening.verdict_policy,
            refresh_interval_secs: toml_config.refresh.interval_secs,
            sources: toml_config.sources,
            api_bind_address: toml_config.api.bind_address,
            api_port: toml_config.api.port,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Store path from SANCTIONS_STORE_PATH, or the built-in default
    pub fn store_path_from_env() -> PathBuf {
        env::var_os(STORE_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load from a path, falling back to defaults when the file is missing or invalid
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Apply SANCTIONS_STORE_PATH if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = env::var_os(STORE_PATH_ENV).filter(|v| !v.is_empty()) {
            self.store_path = PathBuf::from(path);
        }
        self
    }

    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    pub fn with_verdict_policy(mut self, policy: VerdictPolicy) -> Self {
        self.verdict_policy = policy;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn verdict_policy(&self) -> VerdictPolicy {
        self.verdict_policy
    }

    pub fn refresh_interval_secs(&self) -> u64 {
        self.refresh_interval_secs
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store_path(), Path::new("data/sanctions.json"));
        assert_eq!(config.verdict_policy(), VerdictPolicy::NameOnly);
        assert_eq!(config.refresh_interval_secs(), 86_400);
        assert!(config.sources().is_empty());
        assert_eq!(config.api_port(), 8080);
        assert_eq!(config.metrics_interval_secs(), 60);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "sanctions-screen".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["sanctions-screen".to_string(), "--config=config/eu.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/eu.toml");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[screening]
verdict_policy = "require_dob"

[[sources]]
kind = "http"
location = "https://lists.example.org/sanctions.json"
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline");

        assert_eq!(config.verdict_policy(), VerdictPolicy::RequireDob);
        assert_eq!(config.store_path(), Path::new("data/sanctions.json"));
        assert_eq!(config.sources().len(), 1);
        assert_eq!(config.sources()[0].kind, SourceKind::Http);
        assert_eq!(config.sources()[0].timeout_ms, 30_000);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let parsed: Result<TomlConfig, _> = toml::from_str("[screening]\nverdict_policy = \"fuzzy\"\n");
        assert!(parsed.is_err());
    }
}
