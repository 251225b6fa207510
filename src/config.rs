//! Global configuration parsing and validation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::activity::{ActivityMode, ActivityPlan, PlannedActivity};
use crate::{AppError, Result};

/// Settings passed to the process manager when a session worker starts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Entry point the process manager launches for each session.
    #[serde(default = "default_script_ref")]
    pub script_ref: String,
    /// Extra arguments handed to the entry point.
    #[serde(default)]
    pub args: Vec<String>,
    /// Stop a worker after this many idle seconds; 0 disables reaping.
    #[serde(default)]
    pub idle_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            script_ref: default_script_ref(),
            args: Vec::new(),
            idle_timeout_seconds: 0,
        }
    }
}

/// Transition audit log settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// Whether accepted transitions are appended to a JSONL audit log.
    #[serde(default)]
    pub enabled: bool,
    /// Directory for audit files; defaults to `<data_dir>/logs`.
    pub log_dir: Option<PathBuf>,
}

/// One activity inside a workshop definition.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ActivityConfig {
    /// Activity identifier.
    pub id: String,
    /// Mode sequence, e.g. `["individual", "group"]`.
    pub modes: Vec<ActivityMode>,
}

/// Static workshop definition served by the built-in catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkshopConfig {
    /// Workshop identifier.
    pub id: String,
    /// Quorum for sessions of this workshop.
    pub required_active_profile_count: u32,
    /// Ordered activities.
    #[serde(default)]
    pub activities: Vec<ActivityConfig>,
}

impl WorkshopConfig {
    /// Build the validated activity plan for this workshop.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the activity list is malformed.
    pub fn plan(&self) -> Result<ActivityPlan> {
        ActivityPlan::new(
            self.activities
                .iter()
                .map(|a| PlannedActivity::new(a.id.clone(), a.modes.clone()))
                .collect(),
        )
    }
}

/// Static session-to-workshop binding.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Session identifier.
    pub id: String,
    /// Workshop the session plays.
    pub workshop_id: String,
}

fn default_script_ref() -> String {
    "session-worker".into()
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_broadcast_capacity() -> usize {
    128
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the `SQLite` database and default audit logs.
    pub data_dir: PathBuf,
    /// Bounded mailbox size of each session worker.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
    /// Per-session broadcast buffer; slow subscribers lag past this.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Days after deletion before a session's data is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Worker process settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Workshops served by the static catalog.
    #[serde(default)]
    pub workshops: Vec<WorkshopConfig>,
    /// Session bindings served by the static catalog.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("conductor.db")
    }

    /// Directory for audit logs.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.audit
            .log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    /// Idle timeout for workers, `None` when reaping is disabled.
    #[must_use]
    pub fn worker_idle_timeout(&self) -> Option<Duration> {
        (self.worker.idle_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.worker.idle_timeout_seconds))
    }

    fn validate(&mut self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(AppError::Config(
                "mailbox_capacity must be greater than zero".into(),
            ));
        }

        if self.broadcast_capacity == 0 {
            return Err(AppError::Config(
                "broadcast_capacity must be greater than zero".into(),
            ));
        }

        if self.worker.script_ref.trim().is_empty() {
            return Err(AppError::Config("worker.script_ref must not be empty".into()));
        }

        let mut workshop_ids = HashSet::new();
        for workshop in &self.workshops {
            if !workshop_ids.insert(workshop.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate workshop id '{}'",
                    workshop.id
                )));
            }
            if workshop.required_active_profile_count == 0 {
                return Err(AppError::Config(format!(
                    "workshop '{}' required_active_profile_count must be at least 1",
                    workshop.id
                )));
            }
            workshop
                .plan()
                .map_err(|err| AppError::Config(format!("workshop '{}': {err}", workshop.id)))?;
        }

        let mut session_ids = HashSet::new();
        for session in &self.sessions {
            if !session_ids.insert(session.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate session id '{}'",
                    session.id
                )));
            }
            if !workshop_ids.contains(session.workshop_id.as_str()) {
                return Err(AppError::Config(format!(
                    "session '{}' references unknown workshop '{}'",
                    session.id, session.workshop_id
                )));
            }
        }

        let canonical = self
            .data_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("data_dir invalid: {err}")))?;
        self.data_dir = canonical;

        Ok(())
    }
}
