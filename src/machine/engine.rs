//! # Transition engine for one machine instance.
//!
//! [`StateMachine`] owns an instance's current state and step counter and
//! applies events against the shared [`MachineDef`] table:
//!
//! ```text
//! apply(event)
//!   ├─► stay event        → run stay hook            → Stayed
//!   ├─► no table entry    → nothing                  → Rejected
//!   └─► transition found  → exit hook
//!                           move current state
//!                           entry hook (status captured)
//!                           step += 1
//!                           build TransitionRecord   → Applied
//! ```
//!
//! ## Rules
//! - A rejected event is a pure no-op: no hooks, no counter change.
//! - `step_number` counts **applied** transitions, starting at the synthetic
//!   `Initial → start-state` transition (step 1). It never resets, including
//!   across offline/rehydration cycles.
//! - Entry hook failures are captured in the record's entry status; the
//!   transition has already happened and is never rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::machine::definition::{HandlerCtx, MachineDef, TimeoutSpec};

/// Distinguished from-state of every machine's first transition record.
pub const INITIAL_STATE: &str = "Initial";

/// Name of the synthetic event applied when a state timeout fires.
pub const TIMEOUT_EVENT: &str = "Timeout";

/// Result of running a state's entry hook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    /// Entry hook ran successfully (or the state has no handler).
    Ok,
    /// Entry hook reported a failure.
    Failed {
        /// The handler's error message.
        message: String,
    },
}

/// One applied transition, immutable once built.
///
/// Step numbers are per-machine, monotonically increasing, and gap-free
/// over *applied* transitions; sampled-out records leave explainable gaps
/// in persisted history.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    /// Id of the machine instance.
    pub machine_id: Arc<str>,
    /// 1-based applied-transition counter.
    pub step_number: u64,
    /// State before the transition ([`INITIAL_STATE`] for step 1).
    pub from_state: Arc<str>,
    /// State after the transition.
    pub to_state: Arc<str>,
    /// Event that caused the transition.
    pub event_name: Arc<str>,
    /// Wall-clock time of application.
    pub timestamp: DateTime<Utc>,
    /// Result of the target state's entry hook.
    pub entry_action_status: EntryStatus,
}

/// Outcome of applying one event inside the engine.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// A transition was applied. `timeout` is the target state's declared
    /// timeout, for the actor to (re)schedule.
    Applied {
        /// The record describing the transition.
        record: TransitionRecord,
        /// Timeout declared on the new state, if any.
        timeout: Option<TimeoutSpec>,
    },
    /// A stay event ran its hook; state and counters unchanged.
    Stayed,
    /// The current state does not accept the event; pure no-op.
    Rejected,
}

/// Outcome of a registry dispatch, as seen by callers.
#[derive(Clone, Debug)]
pub enum DispatchOutcome {
    /// The event was accepted and a transition applied.
    Applied(TransitionRecord),
    /// The event was accepted as a stay event; no transition.
    Stayed,
    /// The event is not valid for the machine's current state.
    Rejected {
        /// State the machine was in when the event arrived.
        state: Arc<str>,
        /// The rejected event name.
        event: Arc<str>,
    },
}

impl DispatchOutcome {
    /// True for `Applied` and `Stayed` (the event was accepted).
    pub fn accepted(&self) -> bool {
        !matches!(self, DispatchOutcome::Rejected { .. })
    }
}

/// Transition engine for a single machine instance.
///
/// Owned by the machine's actor; never shared. The registry keeps a
/// separate lightweight snapshot of `(current state, step count)` so the
/// instance survives its actor going offline.
pub struct StateMachine {
    id: Arc<str>,
    def: Arc<MachineDef>,
    current: Arc<str>,
    steps: u64,
}

impl StateMachine {
    /// Creates a fresh instance and synthesizes the `Initial → start-state`
    /// transition (step 1), running the start state's entry hook.
    pub async fn start(id: Arc<str>, def: Arc<MachineDef>) -> (Self, ApplyOutcome) {
        let start = def.start_state().clone();
        let mut machine = Self {
            id,
            def,
            current: start.clone(),
            steps: 0,
        };
        let entry = machine.run_entry(&start, INITIAL_STATE, None).await;
        machine.steps = 1;
        let record = machine.make_record(INITIAL_STATE.into(), start.clone(), INITIAL_STATE, entry);
        let timeout = machine.def.timeout_of(&start);
        (machine, ApplyOutcome::Applied { record, timeout })
    }

    /// Resumes a rehydrated instance at a known state and step count.
    ///
    /// No record is synthesized and no hook runs: the instance never left
    /// its state, it only went offline.
    pub fn resume(id: Arc<str>, def: Arc<MachineDef>, current: Arc<str>, steps: u64) -> Self {
        Self {
            id,
            def,
            current,
            steps,
        }
    }

    /// Current state name.
    pub fn current_state(&self) -> &Arc<str> {
        &self.current
    }

    /// Applied-transition count so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Timeout declared on the current state, if any.
    pub fn pending_timeout(&self) -> Option<TimeoutSpec> {
        self.def.timeout_of(&self.current)
    }

    /// Applies one named event.
    pub async fn apply(&mut self, event: &str, payload: Option<&serde_json::Value>) -> ApplyOutcome {
        if self.def.is_stay(&self.current, event) {
            if let Some(handler) = self.def.handler_of(&self.current) {
                handler
                    .on_stay(HandlerCtx {
                        machine_id: &self.id,
                        event,
                        payload,
                    })
                    .await;
            }
            return ApplyOutcome::Stayed;
        }

        let Some(target) = self.def.target(&self.current, event) else {
            return ApplyOutcome::Rejected;
        };
        self.transition_to(target, event, payload).await
    }

    /// Applies the synthetic timeout transition for the current state.
    ///
    /// Returns `None` if the current state declares no timeout; the caller's
    /// timer was stale and the firing must be ignored.
    pub async fn apply_timeout(&mut self) -> Option<ApplyOutcome> {
        let spec = self.def.timeout_of(&self.current)?;
        Some(self.transition_to(spec.target, TIMEOUT_EVENT, None).await)
    }

    async fn transition_to(
        &mut self,
        target: Arc<str>,
        event: &str,
        payload: Option<&serde_json::Value>,
    ) -> ApplyOutcome {
        let from = self.current.clone();

        if let Some(handler) = self.def.handler_of(&from) {
            handler
                .on_exit(HandlerCtx {
                    machine_id: &self.id,
                    event,
                    payload,
                })
                .await;
        }

        self.current = target.clone();
        let entry = self.run_entry(&target, event, payload).await;
        self.steps += 1;

        let record = self.make_record(from, target.clone(), event, entry);
        let timeout = self.def.timeout_of(&target);
        ApplyOutcome::Applied { record, timeout }
    }

    async fn run_entry(
        &self,
        state: &Arc<str>,
        event: &str,
        payload: Option<&serde_json::Value>,
    ) -> EntryStatus {
        match self.def.handler_of(state) {
            Some(handler) => {
                let res = handler
                    .on_entry(HandlerCtx {
                        machine_id: &self.id,
                        event,
                        payload,
                    })
                    .await;
                match res {
                    Ok(()) => EntryStatus::Ok,
                    Err(message) => {
                        log::warn!(
                            "entry hook failed: machine={} state={} err={}",
                            self.id,
                            state,
                            message
                        );
                        EntryStatus::Failed { message }
                    }
                }
            }
            None => EntryStatus::Ok,
        }
    }

    fn make_record(
        &self,
        from: Arc<str>,
        to: Arc<str>,
        event: &str,
        entry: EntryStatus,
    ) -> TransitionRecord {
        TransitionRecord {
            machine_id: self.id.clone(),
            step_number: self.steps,
            from_state: from,
            to_state: to,
            event_name: event.into(),
            timestamp: Utc::now(),
            entry_action_status: entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::definition::MachineDef;
    use std::time::Duration;

    fn def() -> Arc<MachineDef> {
        MachineDef::builder("CallMachine", "IDLE")
            .state("IDLE").on("IncomingCall", "RINGING").done()
            .state("RINGING")
                .on("Answer", "CONNECTED")
                .on("Hangup", "IDLE")
                .stay("SessionProgress")
                .timeout(Duration::from_secs(30), "HUNGUP")
                .done()
            .state("CONNECTED").on("Hangup", "IDLE").done()
            .state("HUNGUP").on("IncomingCall", "RINGING").done()
            .build()
    }

    #[tokio::test]
    async fn test_initial_record_is_step_one() {
        let (machine, outcome) = StateMachine::start("m1".into(), def()).await;
        let ApplyOutcome::Applied { record, timeout } = outcome else {
            panic!("start must apply");
        };
        assert_eq!(record.step_number, 1);
        assert_eq!(&*record.from_state, INITIAL_STATE);
        assert_eq!(&*record.to_state, "IDLE");
        assert_eq!(&*record.event_name, INITIAL_STATE);
        assert_eq!(record.entry_action_status, EntryStatus::Ok);
        assert!(timeout.is_none());
        assert_eq!(&**machine.current_state(), "IDLE");
        assert_eq!(machine.steps(), 1);
    }

    #[tokio::test]
    async fn test_apply_and_reject() {
        let (mut machine, _) = StateMachine::start("m1".into(), def()).await;

        match machine.apply("IncomingCall", None).await {
            ApplyOutcome::Applied { record, timeout } => {
                assert_eq!(record.step_number, 2);
                assert_eq!(&*record.from_state, "IDLE");
                assert_eq!(&*record.to_state, "RINGING");
                assert_eq!(timeout.unwrap().after, Duration::from_secs(30));
            }
            other => panic!("expected Applied, got {other:?}"),
        }

        // Answer is not valid in IDLE-like states it was not declared for.
        assert!(matches!(
            machine.apply("IncomingCall", None).await,
            ApplyOutcome::Rejected
        ));
        assert_eq!(machine.steps(), 2);
        assert_eq!(&**machine.current_state(), "RINGING");
    }

    #[tokio::test]
    async fn test_stay_event_keeps_state_and_counter() {
        let (mut machine, _) = StateMachine::start("m1".into(), def()).await;
        machine.apply("IncomingCall", None).await;
        assert!(matches!(
            machine.apply("SessionProgress", None).await,
            ApplyOutcome::Stayed
        ));
        assert_eq!(machine.steps(), 2);
        assert_eq!(&**machine.current_state(), "RINGING");
    }

    #[tokio::test]
    async fn test_timeout_transition() {
        let (mut machine, _) = StateMachine::start("m1".into(), def()).await;
        machine.apply("IncomingCall", None).await;

        let outcome = machine.apply_timeout().await.expect("RINGING has a timeout");
        let ApplyOutcome::Applied { record, .. } = outcome else {
            panic!("timeout must apply");
        };
        assert_eq!(&*record.event_name, TIMEOUT_EVENT);
        assert_eq!(&*record.to_state, "HUNGUP");

        // HUNGUP has no timeout: a stale firing is a no-op.
        assert!(machine.apply_timeout().await.is_none());
    }

    #[tokio::test]
    async fn test_resume_preserves_counter() {
        let machine = StateMachine::resume("m1".into(), def(), "CONNECTED".into(), 7);
        assert_eq!(machine.steps(), 7);
        assert_eq!(&**machine.current_state(), "CONNECTED");
    }
}
