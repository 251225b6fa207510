//! Machine state and the externally observable snapshot.

use serde::{Deserialize, Serialize};

use super::activity::{ActivityPlan, Cursor};
use super::context::SessionContext;

/// State path of the waiting phase.
pub const WAITING: &str = "waiting";

/// State path of the terminal results phase.
pub const VIEW_RESULTS: &str = "viewResults";

/// Position of a session in its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Gathering participants until the start quorum is ready.
    Waiting,
    /// Playing the (activity, mode) step at the cursor.
    Activity(Cursor),
    /// All steps done; terminal.
    ViewResults,
}

impl MachineState {
    /// Render the state path, e.g. `activity-2.group`.
    ///
    /// A cursor outside the plan renders as `waiting`; cursors are only ever
    /// produced by the plan itself, so this does not occur in practice.
    #[must_use]
    pub fn path(self, plan: &ActivityPlan) -> String {
        match self {
            Self::Waiting => WAITING.to_owned(),
            Self::ViewResults => VIEW_RESULTS.to_owned(),
            Self::Activity(cursor) => match (plan.activity_id(cursor), plan.mode(cursor)) {
                (Some(id), Some(mode)) => format!("{id}.{mode}"),
                _ => WAITING.to_owned(),
            },
        }
    }

    /// Resolve a persisted state path against `plan`.
    ///
    /// Returns `None` when the path names an activity or mode the plan does
    /// not contain.
    #[must_use]
    pub fn resolve(path: &str, plan: &ActivityPlan) -> Option<Self> {
        match path {
            WAITING => Some(Self::Waiting),
            VIEW_RESULTS => Some(Self::ViewResults),
            _ => {
                let (activity_id, mode) = path.rsplit_once('.')?;
                let mode = mode.parse().ok()?;
                plan.locate(activity_id, mode).map(Self::Activity)
            }
        }
    }
}

/// Observable `(state, context)` pair, the unit persisted and broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    /// State path (`waiting`, `<activityId>.<mode>`, `viewResults`).
    pub value: String,
    /// Per-session counter bumped on every accepted transition.
    pub version: u64,
    /// Session context at this version.
    pub context: SessionContext,
}
