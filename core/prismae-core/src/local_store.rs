//! On-device stores that outlive a single launch.
//!
//! Three small JSON-backed stores live under [`StorageConfig`]:
//!
//! - [`OnboardingCache`]: which onboarding steps the user has finished
//! - [`MealLog`]: one file per logged meal under `records/`
//! - [`PreferenceStore`]: string → bool flags
//!
//! # Defensive Design
//!
//! Missing or corrupt files read as empty. The app must still launch when a
//! write was interrupted, so loads never fail; only writes return errors.
//!
//! # Atomic Writes
//!
//! Every write goes through a temp file in the same directory followed by a
//! rename, so readers never observe a half-written file.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::session::LocalCleanup;
use crate::storage::StorageConfig;

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Serializes `value` and writes it to `path` via temp file + rename.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::json(format!("serializing {}", path.display()), e))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CoreError::io("creating storage directory", e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| CoreError::io(format!("creating temp file in {}", dir.display()), e))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| CoreError::io(format!("writing temp file for {}", path.display()), e))?;
    tmp.flush()
        .map_err(|e| CoreError::io(format!("flushing temp file for {}", path.display()), e))?;
    tmp.persist(path)
        .map_err(|e| {
            CoreError::io(format!("persisting temp file to {}", path.display()), e.error)
        })?;

    Ok(())
}

/// Reads `path` as JSON. Missing, empty and corrupt files all yield `None`.
pub(crate) fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read local file");
            return None;
        }
    };
    if content.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt local file");
            None
        }
    }
}

/// Removes a file, treating "already gone" as success.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(format!("removing {}", path.display()), e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Onboarding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum OnboardingStep {
    Welcome,
    MealReminders,
    ProfileSetup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct OnboardingProgress {
    pub welcome_completed: bool,
    pub meal_reminders_completed: bool,
    pub profile_setup_completed: bool,
}

impl OnboardingProgress {
    pub fn is_complete(&self) -> bool {
        self.welcome_completed && self.meal_reminders_completed && self.profile_setup_completed
    }

    pub fn mark(&mut self, step: OnboardingStep) {
        match step {
            OnboardingStep::Welcome => self.welcome_completed = true,
            OnboardingStep::MealReminders => self.meal_reminders_completed = true,
            OnboardingStep::ProfileSetup => self.profile_setup_completed = true,
        }
    }
}

/// Cached onboarding progress, so a relaunch resumes where the user left off.
#[derive(Debug, Clone)]
pub struct OnboardingCache {
    path: PathBuf,
}

impl OnboardingCache {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            path: storage.onboarding_file(),
        }
    }

    pub fn load(&self) -> OnboardingProgress {
        read_json_lenient(&self.path).unwrap_or_default()
    }

    pub fn save(&self, progress: &OnboardingProgress) -> Result<()> {
        atomic_write_json(&self.path, progress)
    }

    /// Marks `step` done and returns the updated progress.
    pub fn complete(&self, step: OnboardingStep) -> Result<OnboardingProgress> {
        let mut progress = self.load();
        progress.mark(step);
        self.save(&progress)?;
        Ok(progress)
    }
}

impl LocalCleanup for OnboardingCache {
    fn label(&self) -> &'static str {
        "onboarding"
    }

    fn clear(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Meal records
// ─────────────────────────────────────────────────────────────────────────────

/// A logged meal with its macro totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRecord {
    pub id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub name: String,
    pub total_calories: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    /// The reminder window this meal was logged from, if any.
    #[serde(default)]
    pub meal_window_id: Option<Uuid>,
}

impl MealRecord {
    pub fn new(name: impl Into<String>, total_calories: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            logged_at: Utc::now(),
            name: name.into(),
            total_calories,
            protein_g: 0.0,
            carbs_g: 0.0,
            fat_g: 0.0,
            meal_window_id: None,
        }
    }
}

/// FFI rendering of [`MealRecord`] with string ids and an RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct MealEntry {
    pub id: String,
    pub logged_at: String,
    pub name: String,
    pub total_calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub meal_window_id: Option<String>,
}

impl From<&MealRecord> for MealEntry {
    fn from(record: &MealRecord) -> Self {
        Self {
            id: record.id.to_string(),
            logged_at: record.logged_at.to_rfc3339(),
            name: record.name.clone(),
            total_calories: record.total_calories,
            protein_g: record.protein_g,
            carbs_g: record.carbs_g,
            fat_g: record.fat_g,
            meal_window_id: record.meal_window_id.map(|id| id.to_string()),
        }
    }
}

/// Meal history, one JSON file per record.
#[derive(Debug, Clone)]
pub struct MealLog {
    dir: PathBuf,
}

impl MealLog {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            dir: storage.records_dir(),
        }
    }

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Writes (or overwrites) the record keyed by its id.
    pub fn save(&self, record: &MealRecord) -> Result<()> {
        atomic_write_json(&self.record_path(&record.id), record)
    }

    /// All readable records, newest first.
    pub fn list(&self) -> Vec<MealRecord> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to list meal records"
                );
                return Vec::new();
            }
        };

        let mut records: Vec<MealRecord> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| read_json_lenient(&path))
            .collect();
        records.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
        records
    }

    pub fn remove(&self, id: &Uuid) -> Result<()> {
        remove_file_if_exists(&self.record_path(id))
    }
}

impl LocalCleanup for MealLog {
    fn label(&self) -> &'static str {
        "records"
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io("removing meal records", e)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Preferences
// ─────────────────────────────────────────────────────────────────────────────

/// Boolean feature flags the user toggled on this device.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            path: storage.preferences_file(),
        }
    }

    pub fn all(&self) -> BTreeMap<String, bool> {
        read_json_lenient(&self.path).unwrap_or_default()
    }

    /// Unset flags read as `false`.
    pub fn get(&self, key: &str) -> bool {
        self.all().get(key).copied().unwrap_or(false)
    }

    pub fn set(&self, key: &str, value: bool) -> Result<()> {
        let mut flags = self.all();
        flags.insert(key.to_string(), value);
        atomic_write_json(&self.path, &flags)
    }
}

impl LocalCleanup for PreferenceStore {
    fn label(&self) -> &'static str {
        "preferences"
    }

    fn clear(&self) -> Result<()> {
        remove_file_if_exists(&self.path)
    }
}
