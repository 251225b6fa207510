//! Session registry record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable bookkeeping for a session that has been hosted at least once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// Session identifier.
    pub session_id: String,
    /// Workshop the session's plan was derived from.
    pub workshop_id: String,
    /// Quorum captured at creation.
    pub required_active_profile_count: u32,
    /// First time a worker was started for the session.
    pub created_at: DateTime<Utc>,
    /// Set once the session was deleted by a controller.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Whether the session has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
