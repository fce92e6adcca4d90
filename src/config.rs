// Space Migrator Configuration Module
// Persistent tenant/connection settings with environment overrides

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::migration::{ConflictResolution, EngineConfig};
use crate::remote::cloud::CloudClientConfig;
use crate::remote::http_retry::HttpRetryConfig;

pub const ENV_TENANT_URL: &str = "SPACE_MIGRATOR_TENANT_URL";
pub const ENV_API_KEY: &str = "SPACE_MIGRATOR_API_KEY";

const MIN_TIMEOUT_SECS: u64 = 1;
const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_ITEM_DELAY_MS: u64 = 10_000;

/// Migrator configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Tenant base URL (e.g., https://acme.eu.example-cloud.com)
    #[serde(default)]
    pub tenant_url: String,
    /// API key used as bearer token
    #[serde(default)]
    pub api_key: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pause between migrated items in milliseconds
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    /// Conflict resolution used when none is given on the command line
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default)]
    pub retry: HttpRetryConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_item_delay_ms() -> u64 {
    500
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            tenant_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: default_timeout_secs(),
            item_delay_ms: default_item_delay_ms(),
            conflict_resolution: ConflictResolution::default(),
            retry: HttpRetryConfig::default(),
        }
    }
}

impl fmt::Debug for MigratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratorConfig")
            .field("tenant_url", &self.tenant_url)
            .field("api_key", &redact(&self.api_key))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("item_delay_ms", &self.item_delay_ms)
            .field("conflict_resolution", &self.conflict_resolution)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Show only the last four characters of a secret
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

impl MigratorConfig {
    /// Override fields from environment-style lookups
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_TENANT_URL).filter(|v| !v.trim().is_empty()) {
            self.tenant_url = url.trim().to_string();
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.api_key = key.trim().to_string();
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Settings for the HTTP content client. Call `validate_config` first.
    pub fn client_config(&self) -> Result<CloudClientConfig, String> {
        let tenant_url = parse_tenant_url(&self.tenant_url)?;
        Ok(CloudClientConfig {
            tenant_url,
            api_key: SecretString::from(self.api_key.clone()),
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry.clone(),
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            item_delay: Duration::from_millis(self.item_delay_ms),
        }
    }
}

fn parse_tenant_url(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(format!("Tenant URL is not set (config file or {})", ENV_TENANT_URL));
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let url = Url::parse(&with_scheme).map_err(|e| format!("Invalid tenant URL '{}': {}", raw, e))?;
    if url.host_str().is_none() {
        return Err(format!("Tenant URL '{}' has no host", raw));
    }
    Ok(url)
}

/// Get the path to the config file
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("space-migrator").join("config.json")
}

/// Load configuration from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> MigratorConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config {:?}: {}", path, e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
            }
        }
    }

    MigratorConfig::default()
}

/// Load configuration from the default location and apply env overrides
pub fn load_config() -> MigratorConfig {
    let mut config = load_config_from(&get_config_path());
    config.apply_env_overrides();
    config
}

/// Save configuration to `path`
pub fn save_config_to(path: &Path, config: &MigratorConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

pub fn save_config(config: &MigratorConfig) -> Result<(), String> {
    save_config_to(&get_config_path(), config)
}

/// Clamp numeric settings into range, then check required fields
pub fn validate_config(config: &mut MigratorConfig) -> Result<(), String> {
    config.request_timeout_secs = config
        .request_timeout_secs
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    config.item_delay_ms = config.item_delay_ms.min(MAX_ITEM_DELAY_MS);
    if config.retry.max_retries > 10 {
        config.retry.max_retries = 10;
    }

    parse_tenant_url(&config.tenant_url)?;

    if config.api_key.trim().is_empty() {
        return Err(format!("API key is not set (config file or {})", ENV_API_KEY));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> MigratorConfig {
        MigratorConfig {
            tenant_url: "acme.example-cloud.com".to_string(),
            api_key: "abcdef123456".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = MigratorConfig::default();
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.item_delay_ms, 500);
        assert_eq!(config.conflict_resolution, ConflictResolution::Skip);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_validate_config() {
        let mut config = MigratorConfig::default();
        assert!(validate_config(&mut config).is_err());

        config.tenant_url = "acme.example-cloud.com".to_string();
        assert!(validate_config(&mut config).is_err(), "api key still missing");

        config.api_key = "key".to_string();
        assert!(validate_config(&mut config).is_ok());

        config.tenant_url = "https://".to_string();
        assert!(validate_config(&mut config).is_err());
    }

    #[test]
    fn test_validate_clamps_numbers() {
        let mut config = valid();
        config.request_timeout_secs = 0;
        config.item_delay_ms = 999_999;
        config.retry.max_retries = 50;
        validate_config(&mut config).unwrap();
        assert_eq!(config.request_timeout_secs, MIN_TIMEOUT_SECS);
        assert_eq!(config.item_delay_ms, MAX_ITEM_DELAY_MS);
        assert_eq!(config.retry.max_retries, 10);

        config.request_timeout_secs = 10_000;
        validate_config(&mut config).unwrap();
        assert_eq!(config.request_timeout_secs, MAX_TIMEOUT_SECS);
    }

    #[test]
    fn test_client_config_adds_scheme() {
        let client = valid().client_config().unwrap();
        assert_eq!(client.tenant_url.as_str(), "https://acme.example-cloud.com/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TENANT_URL, " https://other.example-cloud.com "),
            (ENV_API_KEY, ""),
        ]
        .into_iter()
        .collect();
        let mut config = valid();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.tenant_url, "https://other.example-cloud.com");
        assert_eq!(config.api_key, "abcdef123456", "empty override is ignored");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = valid();
        config.conflict_resolution = ConflictResolution::Rename;
        save_config_to(&path, &config).unwrap();

        let loaded = load_config_from(&path);
        assert_eq!(loaded.tenant_url, config.tenant_url);
        assert_eq!(loaded.conflict_resolution, ConflictResolution::Rename);
    }

    #[test]
    fn test_load_tolerates_missing_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_from(&dir.path().join("none.json"));
        assert_eq!(missing.item_delay_ms, 500);

        let partial = dir.path().join("partial.json");
        fs::write(&partial, r#"{"tenant_url":"acme.example-cloud.com"}"#).unwrap();
        let loaded = load_config_from(&partial);
        assert_eq!(loaded.tenant_url, "acme.example-cloud.com");
        assert_eq!(loaded.request_timeout_secs, 30);

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        assert!(load_config_from(&broken).tenant_url.is_empty());
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("abcdef123456"));
        assert!(rendered.contains("****3456"));
        assert_eq!(redact(""), "<unset>");
    }
}
