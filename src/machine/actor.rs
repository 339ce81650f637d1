//! # MachineActor: per-machine serialization point.
//!
//! One actor task owns one online [`StateMachine`]. Everything that can
//! mutate the instance — inbound events, the per-state timeout, the idle
//! window — is multiplexed through this task's select loop, so two events
//! for the same machine are applied in arrival order and a timeout can
//! never race an exiting event: applying a transition replaces the
//! countdown before the loop ever looks at the timer again.
//!
//! ## Loop
//! ```text
//! loop {
//!   select! {
//!     cancel            → exit (process teardown, no unregister event)
//!     command           → apply event → record → publish StateChanged → reply
//!     countdown tick    → publish TimeoutCountdown{remaining}
//!     countdown expiry  → apply synthetic Timeout transition
//!     idle expiry       → publish MachineUnregistered → exit (offline)
//!   }
//! }
//! ```
//!
//! ## Rules
//! - `dispatch` replies only after the transition is applied **and** the
//!   recorder has decided on persistence; bus delivery to observers is
//!   asynchronous after that.
//! - Exactly one `StateChanged` is published per applied transition.
//! - The idle window is armed only while no state timeout is pending.
//! - The shared snapshot cell is refreshed after every applied transition
//!   and on exit, so the registry can list and rehydrate the machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, MonitorEvent, MonitorEventKind};
use crate::history::HistoryRecorder;
use crate::machine::definition::{MachineDef, TimeoutSpec};
use crate::machine::engine::{ApplyOutcome, DispatchOutcome, StateMachine, TransitionRecord};
use crate::registry::MachineCell;

/// Mailbox message for a machine actor.
pub(crate) enum Command {
    /// Apply one event; the outcome is reported on `reply`.
    Apply {
        event: Arc<str>,
        payload: Option<serde_json::Value>,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    /// Take the machine offline now (explicit `mark_offline`).
    GoOffline,
}

/// How the actor obtains its engine on startup.
pub(crate) enum Boot {
    /// Fresh instance: synthesize the initial transition.
    Fresh,
    /// Rehydrated instance: resume at the preserved state and step count.
    Rehydrated { state: Arc<str>, steps: u64 },
}

/// Timing knobs the actor needs from [`Config`](crate::Config).
#[derive(Clone)]
pub(crate) struct ActorTiming {
    pub idle_timeout: Duration,
    pub countdown_tick: Duration,
}

/// Active per-state countdown.
struct Countdown {
    deadline: Instant,
    next_tick: Instant,
    remaining: u64,
}

pub(crate) struct MachineActor {
    pub id: Arc<str>,
    pub def: Arc<MachineDef>,
    pub boot: Boot,
    pub bus: Bus,
    pub recorder: HistoryRecorder,
    pub cell: Arc<MachineCell>,
    pub timing: ActorTiming,
}

impl MachineActor {
    /// Runs the actor until cancellation or idle-offline.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
        self.bus.publish(
            MonitorEvent::new(MonitorEventKind::MachineRegistered).with_machine(self.id.clone()),
        );

        let mut countdown: Option<Countdown> = None;
        let mut engine = match std::mem::replace(&mut self.boot, Boot::Fresh) {
            Boot::Fresh => {
                let (engine, outcome) = StateMachine::start(self.id.clone(), self.def.clone()).await;
                if let ApplyOutcome::Applied { record, timeout } = outcome {
                    countdown = self.commit(&engine, record, timeout);
                }
                engine
            }
            Boot::Rehydrated { state, steps } => {
                let engine = StateMachine::resume(self.id.clone(), self.def.clone(), state, steps);
                // The preserved state's timeout re-arms at full duration.
                countdown = engine.pending_timeout().map(|spec| self.schedule(&spec));
                engine
            }
        };

        let mut idle_deadline = Instant::now() + self.timing.idle_timeout;

        loop {
            let wake = match &countdown {
                Some(c) => c.next_tick.min(c.deadline),
                None => idle_deadline,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,

                cmd = rx.recv() => match cmd {
                    None => break,
                    Some(Command::GoOffline) => {
                        self.go_offline(&engine);
                        return;
                    }
                    Some(Command::Apply { event, payload, reply }) => {
                        idle_deadline = Instant::now() + self.timing.idle_timeout;
                        match engine.apply(&event, payload.as_ref()).await {
                            ApplyOutcome::Applied { record, timeout } => {
                                let outcome = DispatchOutcome::Applied(record.clone());
                                countdown = self.commit(&engine, record, timeout);
                                let _ = reply.send(outcome);
                            }
                            ApplyOutcome::Stayed => {
                                let _ = reply.send(DispatchOutcome::Stayed);
                            }
                            ApplyOutcome::Rejected => {
                                let state = engine.current_state().clone();
                                log::debug!(
                                    "event rejected: machine={} state={} event={}",
                                    self.id, state, event
                                );
                                self.bus.publish(
                                    MonitorEvent::new(MonitorEventKind::EventRejected)
                                        .with_machine(self.id.clone())
                                        .with_event_name(event.clone()),
                                );
                                let _ = reply.send(DispatchOutcome::Rejected { state, event });
                            }
                        }
                    }
                },

                _ = tokio::time::sleep_until(wake) => {
                    let Some(c) = countdown.as_mut() else {
                        // Idle window elapsed with no pending timeout.
                        self.go_offline(&engine);
                        return;
                    };
                    if Instant::now() >= c.deadline {
                        // Only reachable while the current state declares a
                        // timeout, so apply_timeout always applies.
                        countdown = match engine.apply_timeout().await {
                            Some(ApplyOutcome::Applied { record, timeout }) => {
                                self.commit(&engine, record, timeout)
                            }
                            _ => None,
                        };
                        idle_deadline = Instant::now() + self.timing.idle_timeout;
                    } else {
                        c.remaining = c.remaining.saturating_sub(1);
                        if c.remaining >= 1 {
                            self.publish_countdown(c.remaining);
                        }
                        c.next_tick += self.timing.countdown_tick;
                    }
                }
            }
        }

        self.cell.store(engine.current_state().clone(), engine.steps());
    }

    /// Records an applied transition, publishes its `StateChanged`, updates
    /// the shared snapshot, and schedules the new state's countdown.
    fn commit(
        &self,
        engine: &StateMachine,
        record: TransitionRecord,
        timeout: Option<TimeoutSpec>,
    ) -> Option<Countdown> {
        self.cell.store(engine.current_state().clone(), engine.steps());
        self.recorder.record(&record);
        self.bus
            .publish(MonitorEvent::new(MonitorEventKind::StateChanged).with_record(record));
        timeout.map(|spec| self.schedule(&spec))
    }

    /// Arms a countdown and emits the first tick at the full remainder.
    fn schedule(&self, spec: &TimeoutSpec) -> Countdown {
        let now = Instant::now();
        let remaining = spec.after.as_secs();
        if remaining >= 1 {
            self.publish_countdown(remaining);
        }
        Countdown {
            deadline: now + spec.after,
            next_tick: now + self.timing.countdown_tick,
            remaining,
        }
    }

    fn publish_countdown(&self, remaining: u64) {
        self.bus.publish(
            MonitorEvent::new(MonitorEventKind::TimeoutCountdown)
                .with_machine(self.id.clone())
                .with_remaining(remaining),
        );
    }

    fn go_offline(&self, engine: &StateMachine) {
        self.cell.store(engine.current_state().clone(), engine.steps());
        log::info!("machine going offline: {}", self.id);
        self.bus.publish(
            MonitorEvent::new(MonitorEventKind::MachineUnregistered).with_machine(self.id.clone()),
        );
    }
}
