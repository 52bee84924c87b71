//! Storage configuration and path management for on-device Prismae data.
//!
//! All file locations used by the core are decided here, so tests can point
//! the whole crate at a temp directory with `StorageConfig::with_root()`.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

const DEFAULT_DIR_NAME: &str = ".prismae";

/// Central configuration for all on-device storage paths.
///
/// Production code uses `StorageConfig::from_home()` which points to `~/.prismae/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the default root under the user's home directory.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CoreError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(DEFAULT_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Uses `root` when given, otherwise the home default.
    pub fn resolve(root: Option<&str>) -> Result<Self> {
        match root {
            Some(path) if !path.trim().is_empty() => Ok(Self::with_root(PathBuf::from(path))),
            _ => Self::from_home(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Persisted auth tokens for session restore on launch.
    pub fn auth_session_file(&self) -> PathBuf {
        self.root.join("auth-session.json")
    }

    /// Cached onboarding progress.
    pub fn onboarding_file(&self) -> PathBuf {
        self.root.join("onboarding.json")
    }

    /// Local preference flags.
    pub fn preferences_file(&self) -> PathBuf {
        self.root.join("preferences.json")
    }

    /// Optional config file read by `CoreConfig::load`.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// One JSON file per logged meal.
    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-prismae"));
        assert_eq!(config.root(), Path::new("/tmp/test-prismae"));
    }

    #[test]
    fn test_paths_live_under_root() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/p"));
        assert_eq!(config.auth_session_file(), Path::new("/tmp/p/auth-session.json"));
        assert_eq!(config.onboarding_file(), Path::new("/tmp/p/onboarding.json"));
        assert_eq!(config.preferences_file(), Path::new("/tmp/p/preferences.json"));
        assert_eq!(config.records_dir(), Path::new("/tmp/p/records"));
        assert_eq!(config.logs_dir(), Path::new("/tmp/p/logs"));
    }

    #[test]
    fn test_resolve_prefers_explicit_root() {
        let config = StorageConfig::resolve(Some("/tmp/explicit")).unwrap();
        assert_eq!(config.root(), Path::new("/tmp/explicit"));
    }

    #[test]
    fn test_resolve_blank_root_falls_back_to_home() {
        if let Ok(config) = StorageConfig::resolve(Some("  ")) {
            assert!(config.root().ends_with(DEFAULT_DIR_NAME));
        }
    }
}
