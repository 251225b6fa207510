//! Live session context mutated by the state machine.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::activity::ActivityMode;

/// One participant's answer for an (activity, mode) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    /// Participant profile identifier.
    pub profile_id: String,
    /// Latest submitted value; last write wins.
    pub value: String,
    /// Whether the participant marked this answer as final.
    pub ready: bool,
}

/// Results of a single activity keyed by mode.
pub type ModeResults = BTreeMap<ActivityMode, Vec<ResultRecord>>;

/// Per-session mutable state owned by exactly one session worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Quorum: participants needed to start and to advance a phase.
    pub required_active_profile_count: u32,
    /// Profiles currently connected.
    pub current_active_profiles: BTreeSet<String>,
    /// Profiles that asked to start; only meaningful while waiting.
    pub ready_active_profiles: BTreeSet<String>,
    /// Answers keyed by activity id, then by mode.
    pub activity_result: BTreeMap<String, ModeResults>,
    /// Milliseconds since the Unix epoch of the last accepted transition.
    pub last_updated_timestamp: i64,
}

impl SessionContext {
    /// Fresh context for a session with the given quorum.
    #[must_use]
    pub fn new(required_active_profile_count: u32) -> Self {
        Self {
            required_active_profile_count,
            current_active_profiles: BTreeSet::new(),
            ready_active_profiles: BTreeSet::new(),
            activity_result: BTreeMap::new(),
            last_updated_timestamp: 0,
        }
    }

    /// Records for an (activity, mode) pair; empty when none exist.
    #[must_use]
    pub fn records(&self, activity_id: &str, mode: ActivityMode) -> &[ResultRecord] {
        self.activity_result
            .get(activity_id)
            .and_then(|modes| modes.get(&mode))
            .map_or(&[], Vec::as_slice)
    }

    /// Insert or update `profile_id`'s value, keeping its ready flag.
    pub fn upsert_value(
        &mut self,
        activity_id: &str,
        mode: ActivityMode,
        profile_id: &str,
        value: &str,
    ) {
        let record = self.record_mut(activity_id, mode, profile_id);
        value.clone_into(&mut record.value);
    }

    /// Mark `profile_id`'s record ready, keeping its value. A missing record
    /// is created with an empty placeholder value.
    pub fn mark_ready(&mut self, activity_id: &str, mode: ActivityMode, profile_id: &str) {
        self.record_mut(activity_id, mode, profile_id).ready = true;
    }

    fn record_mut(
        &mut self,
        activity_id: &str,
        mode: ActivityMode,
        profile_id: &str,
    ) -> &mut ResultRecord {
        let records = self
            .activity_result
            .entry(activity_id.to_owned())
            .or_default()
            .entry(mode)
            .or_default();

        let index = match records.iter().position(|r| r.profile_id == profile_id) {
            Some(index) => index,
            None => {
                records.push(ResultRecord {
                    profile_id: profile_id.to_owned(),
                    value: String::new(),
                    ready: false,
                });
                records.len() - 1
            }
        };
        &mut records[index]
    }
}
