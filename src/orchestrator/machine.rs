//! Session state machine: pure transition function plus guards.
//!
//! ```text
//! waiting ──readyToStart (quorum reached)──▶ a1.m1 ──setReady (all ready)──▶ a1.m2 … ──▶ viewResults
//! ```
//!
//! Every action either yields a new `(state, context)` pair or nothing at
//! all. Failed guards and stale activity ids are silent no-ops, never
//! errors, and a no-op is never persisted or broadcast.

use std::sync::Arc;

use crate::models::action::SessionAction;
use crate::models::activity::ActivityPlan;
use crate::models::context::{ResultRecord, SessionContext};
use crate::models::snapshot::{MachineState, Snapshot};
use crate::{AppError, Result};

/// Apply `action` to `(state, context)`.
///
/// Returns `None` when the action is rejected or changes nothing.
#[must_use]
pub fn transition(
    plan: &ActivityPlan,
    state: MachineState,
    context: &SessionContext,
    action: &SessionAction,
) -> Option<(MachineState, SessionContext)> {
    let mut next = context.clone();

    let next_state = match (state, action) {
        (MachineState::Waiting, SessionAction::Join { profile_id }) => {
            next.current_active_profiles.insert(profile_id.clone());
            state
        }
        (MachineState::Waiting, SessionAction::Disconnect { profile_id }) => {
            next.current_active_profiles.remove(profile_id);
            state
        }
        (MachineState::Waiting, SessionAction::ReadyToStart { profile_id }) => {
            next.ready_active_profiles.insert(profile_id.clone());
            if start_guard(&next) {
                plan.first_cursor()
                    .map_or(MachineState::ViewResults, MachineState::Activity)
            } else {
                state
            }
        }
        (
            MachineState::Activity(cursor),
            SessionAction::SetValue {
                profile_id,
                activity_id,
                value,
            },
        ) => {
            let mode = plan.mode(cursor)?;
            if plan.activity_id(cursor)? != activity_id.as_str() {
                return None;
            }
            next.upsert_value(activity_id, mode, profile_id, value);
            state
        }
        (
            MachineState::Activity(cursor),
            SessionAction::SetReady {
                profile_id,
                activity_id,
            },
        ) => {
            let mode = plan.mode(cursor)?;
            if plan.activity_id(cursor)? != activity_id.as_str() {
                return None;
            }
            next.mark_ready(activity_id, mode, profile_id);
            let records = next.records(activity_id, mode);
            if advance_guard(records, next.required_active_profile_count, profile_id) {
                plan.next_cursor(cursor)
                    .map_or(MachineState::ViewResults, MachineState::Activity)
            } else {
                state
            }
        }
        _ => return None,
    };

    if next_state == state && next == *context {
        return None;
    }
    Some((next_state, next))
}

/// Start guard, evaluated after the acting profile joined the ready set.
fn start_guard(context: &SessionContext) -> bool {
    quorum_matches(
        context.ready_active_profiles.len(),
        context.required_active_profile_count,
    )
}

/// Advance guard, evaluated after the acting profile's own `setReady` was
/// applied: exactly `quorum` records, every other profile ready. The acting
/// profile's readiness is implied by the action itself.
fn advance_guard(records: &[ResultRecord], quorum: u32, acting_profile: &str) -> bool {
    quorum_matches(records.len(), quorum)
        && records
            .iter()
            .all(|record| record.ready || record.profile_id == acting_profile)
}

fn quorum_matches(count: usize, quorum: u32) -> bool {
    u32::try_from(count).is_ok_and(|count| count == quorum)
}

/// A live machine instance: plan, state, context, and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMachine {
    plan: Arc<ActivityPlan>,
    state: MachineState,
    context: SessionContext,
    version: u64,
}

impl SessionMachine {
    /// Fresh machine in `waiting`.
    #[must_use]
    pub fn new(plan: Arc<ActivityPlan>, required_active_profile_count: u32) -> Self {
        Self {
            plan,
            state: MachineState::Waiting,
            context: SessionContext::new(required_active_profile_count),
            version: 0,
        }
    }

    /// Rebuild a machine from a persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` if the snapshot's state path does not
    /// exist in `plan` (the workshop changed under a live session).
    pub fn from_snapshot(plan: Arc<ActivityPlan>, snapshot: Snapshot) -> Result<Self> {
        let state = MachineState::resolve(&snapshot.value, &plan).ok_or_else(|| {
            AppError::Catalog(format!(
                "snapshot state '{}' is not part of the activity plan",
                snapshot.value
            ))
        })?;
        Ok(Self {
            plan,
            state,
            context: snapshot.context,
            version: snapshot.version,
        })
    }

    /// Compute the successor machine for `action`, stamped with `now_ms`.
    ///
    /// Returns `None` for a rejected or no-op action; `self` is never
    /// modified, so the caller decides when to commit.
    #[must_use]
    pub fn step(&self, action: &SessionAction, now_ms: i64) -> Option<Self> {
        let (state, mut context) = transition(&self.plan, self.state, &self.context, action)?;
        context.last_updated_timestamp = now_ms;
        Some(Self {
            plan: Arc::clone(&self.plan),
            state,
            context,
            version: self.version + 1,
        })
    }

    /// Current observable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            value: self.state.path(&self.plan),
            version: self.version,
            context: self.context.clone(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Current context.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Activity plan the machine walks.
    #[must_use]
    pub fn plan(&self) -> &Arc<ActivityPlan> {
        &self.plan
    }
}
