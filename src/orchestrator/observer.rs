//! Observer callbacks invoked by a session worker after every accepted
//! transition, in registration order.

use tracing::info;

use crate::models::action::SessionAction;
use crate::models::snapshot::Snapshot;

/// An accepted transition as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct TransitionEvent<'a> {
    /// Session the transition belongs to.
    pub session_id: &'a str,
    /// Action that caused it.
    pub action: &'a SessionAction,
    /// State path before the action.
    pub previous_state: &'a str,
    /// Snapshot after the action (already persisted).
    pub snapshot: &'a Snapshot,
}

/// Receives accepted transitions. Must not block; failures are the
/// observer's own business and never affect the transition.
pub trait SessionObserver: Send + Sync {
    /// Called once per accepted transition.
    fn on_transition(&self, event: &TransitionEvent<'_>);
}

/// Logs every accepted transition through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_transition(&self, event: &TransitionEvent<'_>) {
        info!(
            session_id = event.session_id,
            action = event.action.name(),
            profile_id = event.action.profile_id(),
            from = event.previous_state,
            to = %event.snapshot.value,
            version = event.snapshot.version,
            "transition accepted"
        );
    }
}
