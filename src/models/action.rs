//! Inbound participant actions routed to a session worker.

use serde::{Deserialize, Serialize};

/// Action addressed to one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionAction {
    /// Participant connected.
    Join {
        /// Acting profile.
        profile_id: String,
    },
    /// Participant disconnected.
    Disconnect {
        /// Acting profile.
        profile_id: String,
    },
    /// Participant is ready to begin the first activity.
    ReadyToStart {
        /// Acting profile.
        profile_id: String,
    },
    /// Participant submitted or replaced an answer.
    SetValue {
        /// Acting profile.
        profile_id: String,
        /// Activity the answer belongs to.
        activity_id: String,
        /// Answer payload.
        value: String,
    },
    /// Participant finalized their answer for the current phase.
    SetReady {
        /// Acting profile.
        profile_id: String,
        /// Activity being finalized.
        activity_id: String,
    },
}

impl SessionAction {
    /// Profile performing the action.
    #[must_use]
    pub fn profile_id(&self) -> &str {
        match self {
            Self::Join { profile_id }
            | Self::Disconnect { profile_id }
            | Self::ReadyToStart { profile_id }
            | Self::SetValue { profile_id, .. }
            | Self::SetReady { profile_id, .. } => profile_id,
        }
    }

    /// Short action name for logs and audit records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Disconnect { .. } => "disconnect",
            Self::ReadyToStart { .. } => "readyToStart",
            Self::SetValue { .. } => "setValue",
            Self::SetReady { .. } => "setReady",
        }
    }

    /// Whether this action may bring a never-seen session into existence.
    #[must_use]
    pub fn is_creating(&self) -> bool {
        matches!(self, Self::Join { .. })
    }
}
