//! # Tree-view projection of one machine's transition history.
//!
//! [`TreeViewStore`] maintains a versioned, session-scoped view of a single
//! selected machine, grouped by state-entry instance: each time a state is
//! entered, a new [`StateInstance`] with an incremented `instance_number`
//! begins.
//!
//! ## Rules
//! - Selecting a machine **rebuilds** the grouping from the full recorded
//!   history; the view is never patched across selections (no drift).
//! - Every recompute increments `version`; versions are session-local and
//!   start at 0 (the first select pushes version 1).
//! - Live transitions for the selected machine append an instance and
//!   increment the version; transitions on other machines are ignored.
//! - A live transition whose step is already covered by the rebuild is
//!   dropped, so a select racing queued deliveries cannot duplicate
//!   instances.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::machine::TransitionRecord;

/// One contiguous occupancy of a state: from entering it until leaving it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateInstance {
    /// State that was entered.
    pub state: Arc<str>,
    /// 1-based count of entries into this state so far (re-entry bumps it).
    pub instance_number: u32,
    /// Transitions that landed in this occurrence (the arriving one).
    pub transitions: Vec<TransitionRecord>,
}

/// Versioned snapshot pushed to the owning session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeViewSnapshot {
    /// Monotonic per-session version, incremented on every recompute.
    pub version: u64,
    /// Machine the view is bound to, if any.
    pub selected_machine_id: Option<Arc<str>>,
    /// Grouped history, in application order.
    pub state_instances: Vec<StateInstance>,
}

/// Per-session tree-view state.
///
/// Owned by exactly one monitor session; other sessions keep their own
/// store and version sequence.
pub struct TreeViewStore {
    version: u64,
    selected: Option<Arc<str>>,
    instances: Vec<StateInstance>,
    entries_seen: HashMap<Arc<str>, u32>,
    last_step: u64,
}

impl TreeViewStore {
    /// Creates an empty store at version 0 with nothing selected.
    pub fn new() -> Self {
        Self {
            version: 0,
            selected: None,
            instances: Vec::new(),
            entries_seen: HashMap::new(),
            last_step: 0,
        }
    }

    /// Currently selected machine, if any.
    pub fn selected(&self) -> Option<&Arc<str>> {
        self.selected.as_ref()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Binds the view to `machine_id`, rebuilding the grouping from that
    /// machine's full recorded history, and returns the bumped snapshot.
    pub fn select(
        &mut self,
        machine_id: impl Into<Arc<str>>,
        history: &[TransitionRecord],
    ) -> TreeViewSnapshot {
        self.selected = Some(machine_id.into());
        self.instances.clear();
        self.entries_seen.clear();
        self.last_step = 0;
        for record in history {
            self.append(record);
        }
        self.version += 1;
        self.snapshot()
    }

    /// Feeds one live transition.
    ///
    /// Returns the bumped snapshot if the transition belongs to the
    /// selected machine and is newer than everything already shown,
    /// `None` otherwise.
    pub fn on_transition(&mut self, record: &TransitionRecord) -> Option<TreeViewSnapshot> {
        let selected = self.selected.as_deref()?;
        if selected != &*record.machine_id || record.step_number <= self.last_step {
            return None;
        }
        self.append(record);
        self.version += 1;
        Some(self.snapshot())
    }

    /// Clears the selection without resetting the version sequence.
    pub fn deselect(&mut self) {
        self.selected = None;
        self.instances.clear();
        self.entries_seen.clear();
        self.last_step = 0;
    }

    fn append(&mut self, record: &TransitionRecord) {
        self.last_step = self.last_step.max(record.step_number);
        let n = self
            .entries_seen
            .entry(record.to_state.clone())
            .and_modify(|n| *n += 1)
            .or_insert(1);
        self.instances.push(StateInstance {
            state: record.to_state.clone(),
            instance_number: *n,
            transitions: vec![record.clone()],
        });
    }

    fn snapshot(&self) -> TreeViewSnapshot {
        TreeViewSnapshot {
            version: self.version,
            selected_machine_id: self.selected.clone(),
            state_instances: self.instances.clone(),
        }
    }
}

impl Default for TreeViewStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{EntryStatus, INITIAL_STATE};
    use chrono::Utc;

    fn rec(machine: &str, step: u64, from: &str, to: &str) -> TransitionRecord {
        TransitionRecord {
            machine_id: machine.into(),
            step_number: step,
            from_state: from.into(),
            to_state: to.into(),
            event_name: "ev".into(),
            timestamp: Utc::now(),
            entry_action_status: EntryStatus::Ok,
        }
    }

    #[test]
    fn test_select_rebuilds_from_full_history() {
        let history = vec![
            rec("m1", 1, INITIAL_STATE, "IDLE"),
            rec("m1", 2, "IDLE", "RINGING"),
            rec("m1", 3, "RINGING", "CONNECTED"),
        ];
        let mut store = TreeViewStore::new();
        let snap = store.select("m1", &history);

        assert_eq!(snap.version, 1);
        assert_eq!(snap.selected_machine_id.as_deref(), Some("m1"));
        let states: Vec<&str> = snap.state_instances.iter().map(|i| &*i.state).collect();
        assert_eq!(states, vec!["IDLE", "RINGING", "CONNECTED"]);
        assert!(snap.state_instances.iter().all(|i| i.instance_number == 1));
    }

    #[test]
    fn test_reentry_increments_instance_number() {
        let history = vec![
            rec("m1", 1, INITIAL_STATE, "IDLE"),
            rec("m1", 2, "IDLE", "RINGING"),
            rec("m1", 3, "RINGING", "IDLE"),
            rec("m1", 4, "IDLE", "RINGING"),
        ];
        let mut store = TreeViewStore::new();
        let snap = store.select("m1", &history);

        let numbered: Vec<(String, u32)> = snap
            .state_instances
            .iter()
            .map(|i| (i.state.to_string(), i.instance_number))
            .collect();
        assert_eq!(
            numbered,
            vec![
                ("IDLE".to_string(), 1),
                ("RINGING".to_string(), 1),
                ("IDLE".to_string(), 2),
                ("RINGING".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_live_transitions_bump_version_for_selection_only() {
        let mut store = TreeViewStore::new();
        store.select("m1", &[rec("m1", 1, INITIAL_STATE, "IDLE")]);

        assert!(store.on_transition(&rec("m2", 1, INITIAL_STATE, "IDLE")).is_none());
        assert_eq!(store.version(), 1);

        let snap = store.on_transition(&rec("m1", 2, "IDLE", "RINGING")).unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.state_instances.len(), 2);

        let snap = store.on_transition(&rec("m1", 3, "RINGING", "IDLE")).unwrap();
        assert_eq!(snap.version, 3);
        assert_eq!(snap.state_instances.last().unwrap().instance_number, 2);
    }

    #[test]
    fn test_stale_transitions_are_dropped() {
        let mut store = TreeViewStore::new();
        store.select(
            "m1",
            &[
                rec("m1", 1, INITIAL_STATE, "IDLE"),
                rec("m1", 2, "IDLE", "RINGING"),
            ],
        );

        // Already covered by the rebuild: a queued delivery arriving late.
        assert!(store.on_transition(&rec("m1", 2, "IDLE", "RINGING")).is_none());
        assert_eq!(store.version(), 1);

        let snap = store.on_transition(&rec("m1", 3, "RINGING", "IDLE")).unwrap();
        assert_eq!(snap.state_instances.len(), 3);
    }

    #[test]
    fn test_reselect_continues_version_sequence() {
        let mut store = TreeViewStore::new();
        store.select("m1", &[rec("m1", 1, INITIAL_STATE, "IDLE")]);
        let snap = store.select("m2", &[rec("m2", 1, INITIAL_STATE, "IDLE")]);
        assert_eq!(snap.version, 2);
        assert_eq!(snap.state_instances.len(), 1);
    }
}
