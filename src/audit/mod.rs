//! Structured audit logging for session lifecycle events.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends JSONL records to
//! daily-rotating files in the configured audit directory.
//! [`AuditObserver`] feeds every accepted transition into a logger.

pub mod writer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::orchestrator::observer::{SessionObserver, TransitionEvent};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// A worker accepted an action.
    Transition,
    /// An operator deleted a session.
    SessionDeleted,
    /// Retention removed deleted sessions.
    SessionsPurged,
}

/// A structured record of a session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Associated session identifier (absent for store-wide events).
    pub session_id: Option<String>,
    /// Event classification.
    pub event_type: AuditEventType,
    /// Action name (for `transition` events).
    pub action: Option<String>,
    /// Acting profile (for `transition` events).
    pub profile_id: Option<String>,
    /// Full action payload (for `transition` events).
    pub parameters: Option<serde_json::Value>,
    /// State path before the transition.
    pub from_state: Option<String>,
    /// State path after the transition.
    pub to_state: Option<String>,
    /// Snapshot version after the transition.
    pub version: Option<u64>,
    /// Brief result description.
    pub result_summary: Option<String>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            event_type,
            action: None,
            profile_id: None,
            parameters: None,
            from_state: None,
            to_state: None,
            version: None,
            result_summary: None,
        }
    }

    /// Build a `transition` entry from an observer event.
    #[must_use]
    pub fn transition(event: &TransitionEvent<'_>) -> Self {
        let mut entry = Self::new(AuditEventType::Transition)
            .with_session(event.session_id.to_owned());
        entry.action = Some(event.action.name().to_owned());
        entry.profile_id = Some(event.action.profile_id().to_owned());
        entry.parameters = serde_json::to_value(event.action).ok();
        entry.from_state = Some(event.previous_state.to_owned());
        entry.to_state = Some(event.snapshot.value.clone());
        entry.version = Some(event.snapshot.version);
        entry
    }

    /// Set the session identifier for this entry.
    #[must_use]
    pub fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: String) -> Self {
        self.result_summary = Some(summary);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

/// Session observer that records each accepted transition.
///
/// Write failures are logged and otherwise ignored.
pub struct AuditObserver {
    logger: Arc<dyn AuditLogger>,
}

impl AuditObserver {
    /// Wrap `logger`.
    #[must_use]
    pub fn new(logger: Arc<dyn AuditLogger>) -> Self {
        Self { logger }
    }
}

impl SessionObserver for AuditObserver {
    fn on_transition(&self, event: &TransitionEvent<'_>) {
        if let Err(err) = self.logger.log_entry(AuditEntry::transition(event)) {
            warn!(session_id = event.session_id, %err, "failed to write audit entry");
        }
    }
}

pub use writer::JsonlAuditWriter;
