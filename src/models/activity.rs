//! Activity plan: the fixed, ordered sequence of (activity, mode) steps a
//! session walks through.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Participation mode of an activity phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMode {
    /// Each participant answers privately.
    Individual,
    /// Participants converge on a shared answer.
    Group,
}

impl ActivityMode {
    /// Wire name of the mode, as used in state paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

impl Display for ActivityMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "individual" => Ok(Self::Individual),
            "group" => Ok(Self::Group),
            other => Err(AppError::Catalog(format!("invalid activity mode: {other}"))),
        }
    }
}

/// One activity of a workshop with its ordered mode sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedActivity {
    /// Activity identifier, unique within the plan.
    pub id: String,
    /// Modes in the order they are played; never empty.
    pub modes: Vec<ActivityMode>,
}

impl PlannedActivity {
    /// Convenience constructor.
    #[must_use]
    pub fn new(id: impl Into<String>, modes: Vec<ActivityMode>) -> Self {
        Self {
            id: id.into(),
            modes,
        }
    }
}

/// Position inside an [`ActivityPlan`]: activity index and mode index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    /// Index into the plan's activity list.
    pub activity: usize,
    /// Index into that activity's mode list.
    pub mode: usize,
}

/// Validated, ordered activity plan for one workshop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityPlan {
    activities: Vec<PlannedActivity>,
}

impl ActivityPlan {
    /// Build a plan, rejecting empty or duplicated mode lists, modes out of
    /// order (`individual` must precede `group`), and duplicate activity ids.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Catalog` when any of the above checks fails.
    pub fn new(activities: Vec<PlannedActivity>) -> Result<Self> {
        for (index, activity) in activities.iter().enumerate() {
            if activity.id.trim().is_empty() {
                return Err(AppError::Catalog(format!(
                    "activity at position {index} has an empty id"
                )));
            }
            if activity.id.contains('.') {
                return Err(AppError::Catalog(format!(
                    "activity id '{}' must not contain '.'",
                    activity.id
                )));
            }
            if activity.modes.is_empty() {
                return Err(AppError::Catalog(format!(
                    "activity '{}' has no modes",
                    activity.id
                )));
            }
            if activity.modes.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(AppError::Catalog(format!(
                    "activity '{}' modes must be unique and ordered individual before group",
                    activity.id
                )));
            }
            if activities[..index].iter().any(|a| a.id == activity.id) {
                return Err(AppError::Catalog(format!(
                    "duplicate activity id '{}'",
                    activity.id
                )));
            }
        }
        Ok(Self { activities })
    }

    /// Activities in play order.
    #[must_use]
    pub fn activities(&self) -> &[PlannedActivity] {
        &self.activities
    }

    /// Number of activities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Whether the plan has no activities at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// First step of the plan, or `None` for an empty plan.
    #[must_use]
    pub fn first_cursor(&self) -> Option<Cursor> {
        (!self.activities.is_empty()).then_some(Cursor {
            activity: 0,
            mode: 0,
        })
    }

    /// Step following `cursor`: next mode of the same activity, else the
    /// first mode of the next activity, else `None` (plan finished).
    #[must_use]
    pub fn next_cursor(&self, cursor: Cursor) -> Option<Cursor> {
        let activity = self.activities.get(cursor.activity)?;
        if cursor.mode + 1 < activity.modes.len() {
            return Some(Cursor {
                activity: cursor.activity,
                mode: cursor.mode + 1,
            });
        }
        (cursor.activity + 1 < self.activities.len()).then_some(Cursor {
            activity: cursor.activity + 1,
            mode: 0,
        })
    }

    /// Activity id at `cursor`.
    #[must_use]
    pub fn activity_id(&self, cursor: Cursor) -> Option<&str> {
        self.activities
            .get(cursor.activity)
            .map(|activity| activity.id.as_str())
    }

    /// Mode at `cursor`.
    #[must_use]
    pub fn mode(&self, cursor: Cursor) -> Option<ActivityMode> {
        self.activities
            .get(cursor.activity)
            .and_then(|activity| activity.modes.get(cursor.mode).copied())
    }

    /// Locate the cursor for an (activity id, mode) pair.
    #[must_use]
    pub fn locate(&self, activity_id: &str, mode: ActivityMode) -> Option<Cursor> {
        let activity = self.activities.iter().position(|a| a.id == activity_id)?;
        let mode = self.activities[activity]
            .modes
            .iter()
            .position(|m| *m == mode)?;
        Some(Cursor { activity, mode })
    }
}
