//! Configuration loading.
//!
//! `CoreConfig` is passed in directly by native clients. The CLI loads it from a
//! JSON file (missing or partial files fall back to defaults) and then applies
//! `PRISMAE_*` environment overrides.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

pub const DEFAULT_URL_SCHEME: &str = "prismae";

const ENV_SUPABASE_URL: &str = "PRISMAE_SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "PRISMAE_SUPABASE_ANON_KEY";
const ENV_PROXY_URL: &str = "PRISMAE_ANALYSIS_PROXY_URL";
const ENV_PROXY_TOKEN: &str = "PRISMAE_ANALYSIS_PROXY_TOKEN";
const ENV_STORAGE_ROOT: &str = "PRISMAE_STORAGE_ROOT";

/// Connection and storage settings for the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct CoreConfig {
    /// Base URL of the hosted backend project, e.g. `https://xyz.supabase.co`.
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Full URL of the text analysis endpoint.
    pub analysis_proxy_url: String,
    pub analysis_proxy_token: String,
    /// Deep-link scheme registered by the app.
    pub url_scheme: String,
    /// On-device data directory. `None` means `~/.prismae`.
    pub storage_root: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            analysis_proxy_url: String::new(),
            analysis_proxy_token: String::new(),
            url_scheme: DEFAULT_URL_SCHEME.to_string(),
            storage_root: None,
        }
    }
}

impl CoreConfig {
    /// Loads config from `path`, returning defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| CoreError::io("read config", e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).map_err(|e| CoreError::ConfigMalformed {
            path: path.to_path_buf(),
            details: e.to_string(),
        })
    }

    /// Applies non-empty `PRISMAE_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(ENV_SUPABASE_URL) {
            self.supabase_url = value;
        }
        if let Some(value) = get(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = value;
        }
        if let Some(value) = get(ENV_PROXY_URL) {
            self.analysis_proxy_url = value;
        }
        if let Some(value) = get(ENV_PROXY_TOKEN) {
            self.analysis_proxy_token = value;
        }
        if let Some(value) = get(ENV_STORAGE_ROOT) {
            self.storage_root = Some(value);
        }
        self
    }

    /// Checks the fields required to talk to the backend.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("supabase_url", &self.supabase_url),
            ("supabase_anon_key", &self.supabase_anon_key),
            ("url_scheme", &self.url_scheme),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::InvalidInput {
                    field: field.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = CoreConfig::load(&temp.path().join("nope.json")).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.url_scheme, "prismae");
    }

    #[test]
    fn partial_file_keeps_defaults_for_absent_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"supabase_url": "https://example.supabase.co"}"#).unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.supabase_url, "https://example.supabase.co");
        assert_eq!(config.url_scheme, "prismae");
        assert!(config.storage_root.is_none());
    }

    #[test]
    fn malformed_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = CoreConfig::load(&path).unwrap_err();
        assert!(matches!(err, CoreError::ConfigMalformed { .. }));
    }

    #[test]
    fn overrides_replace_only_non_empty_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SUPABASE_URL, "https://override.supabase.co"),
            (ENV_PROXY_TOKEN, "  "),
            (ENV_STORAGE_ROOT, "/tmp/prismae"),
        ]);
        let base = CoreConfig {
            analysis_proxy_token: "original".to_string(),
            ..Default::default()
        };

        let config = base.with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.supabase_url, "https://override.supabase.co");
        assert_eq!(config.analysis_proxy_token, "original");
        assert_eq!(config.storage_root.as_deref(), Some("/tmp/prismae"));
    }

    #[test]
    fn validate_requires_backend_fields() {
        let err = CoreConfig::default().validate().unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidInput { ref field, .. } if field == "supabase_url"
        ));

        let config = CoreConfig {
            supabase_url: "https://x.supabase.co".into(),
            supabase_anon_key: "anon".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
