//! # Machine registry - event-driven instance lifecycle manager.
//!
//! [`Registry`] owns the machine map and routes events:
//! - `dispatch(id, event)` → resolves the target actor, creating or
//!   rehydrating it when absent or offline, and forwards the event
//! - a bus listener reaps actors that reported themselves offline
//! - read-only snapshots serve observer queries at call time
//!
//! ## Architecture
//! ```text
//! dispatch(id, ev) ──► machines[id].runtime ──► actor mailbox ──► engine
//!                        │ (absent/offline)
//!                        └─► spawn actor (Fresh | Rehydrated from cell)
//!
//! Bus ──► Registry.spawn_listener()
//!           └─► MachineUnregistered(id) → drop runtime handle (cell stays)
//! ```
//!
//! ## Rules
//! - Registry owns the actor handles (mailbox + JoinHandle + token).
//! - Per-machine serialization lives in the actor mailbox; the map lock is
//!   held only to resolve or spawn, never across an apply.
//! - Offline is not deletion: the snapshot cell keeps identity, state, and
//!   the step counter for rehydration.
//! - Unknown ids are never an error; dispatch creates the machine.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::DispatchError;
use crate::events::{Bus, MonitorEventKind};
use crate::history::HistoryRecorder;
use crate::machine::actor::{ActorTiming, Boot, Command, MachineActor};
use crate::machine::{DispatchOutcome, MachineDef, TransitionRecord};
use crate::observers::{Observe, ObserverId, ObserverSet};
use crate::registry::flags::RegistryFlags;

/// Mailbox depth per machine actor.
const MAILBOX_CAPACITY: usize = 64;

/// Attempts to deliver one event before giving up on the actor.
const DISPATCH_ATTEMPTS: usize = 3;

/// Shared snapshot of one instance's persistent core.
///
/// Written by the actor after every applied transition; read by the
/// registry for listings and rehydration. Survives the actor going offline.
pub(crate) struct MachineCell {
    inner: std::sync::RwLock<(Arc<str>, u64)>,
}

impl MachineCell {
    fn new(state: Arc<str>) -> Self {
        Self {
            inner: std::sync::RwLock::new((state, 0)),
        }
    }

    pub(crate) fn store(&self, state: Arc<str>, steps: u64) {
        *self.inner.write().expect("cell lock poisoned") = (state, steps);
    }

    fn load(&self) -> (Arc<str>, u64) {
        self.inner.read().expect("cell lock poisoned").clone()
    }
}

struct ActorHandle {
    tx: mpsc::Sender<Command>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

struct MachineSlot {
    cell: Arc<MachineCell>,
    runtime: Option<ActorHandle>,
}

/// Point-in-time description of one machine for listings.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineInfo {
    /// Machine id.
    pub id: Arc<str>,
    /// Machine type name from the definition.
    #[serde(rename = "type")]
    pub kind: Arc<str>,
    /// Current state at snapshot time.
    pub state: Arc<str>,
}

/// Point-in-time snapshot of the registry's shared state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStateSnapshot {
    /// Whether debug mode currently forces full persistence.
    pub debug_mode: bool,
    /// Total machines known (active + offline).
    pub machine_count: usize,
    /// Ids of online machines.
    pub active_machines: Vec<String>,
    /// Ids of offline machines.
    pub offline_machines: Vec<String>,
}

/// Process-scoped machine registry and monitoring context.
///
/// Created once at startup and passed explicitly to sessions and demo
/// drivers; nothing here is an ambient singleton.
pub struct Registry {
    cfg: Config,
    def: Arc<MachineDef>,
    bus: Bus,
    flags: Arc<RegistryFlags>,
    recorder: HistoryRecorder,
    observers: Arc<ObserverSet>,
    machines: RwLock<HashMap<Arc<str>, MachineSlot>>,
    root_token: CancellationToken,
}

impl Registry {
    /// Creates a registry for one machine definition and wires the observer
    /// fan-out to the bus.
    pub fn new(cfg: Config, def: Arc<MachineDef>) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity);
        let flags = Arc::new(RegistryFlags::new(cfg.debug_mode, cfg.sampling_denominator));
        let recorder = HistoryRecorder::new(flags.clone());
        let observers = ObserverSet::new();
        observers.spawn_listener(&bus);

        let registry = Arc::new(Self {
            cfg,
            def,
            bus,
            flags,
            recorder,
            observers,
            machines: RwLock::new(HashMap::new()),
            root_token: CancellationToken::new(),
        });
        registry.clone().spawn_listener();
        registry
    }

    /// Spawns the bus listener that reaps offline actors.
    fn spawn_listener(self: Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let rt = self.root_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = rt.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => {
                            if ev.kind == MonitorEventKind::MachineUnregistered {
                                if let Some(id) = &ev.machine {
                                    self.reap_offline(id).await;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("registry listener lagged, skipped {n} events");
                        }
                    }
                }
            }
        });
    }

    /// Routes one event to `machine_id`, creating or rehydrating the
    /// instance if needed.
    ///
    /// Returns after the transition is applied and offered to the recorder;
    /// observer delivery happens asynchronously. An event the current state
    /// does not accept comes back as [`DispatchOutcome::Rejected`] with no
    /// side effects.
    pub async fn dispatch(
        &self,
        machine_id: &str,
        event: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let id: Arc<str> = machine_id.into();
        let event: Arc<str> = event.into();

        let mut reply_dropped = false;
        for _ in 0..DISPATCH_ATTEMPTS {
            let tx = match self.live_sender(&id).await {
                Some(tx) => tx,
                None => self.spawn_machine(&id).await,
            };

            let (reply_tx, reply_rx) = oneshot::channel();
            let cmd = Command::Apply {
                event: event.clone(),
                payload: payload.clone(),
                reply: reply_tx,
            };
            if tx.send(cmd).await.is_err() {
                // Actor exited between resolve and send; rehydrate and retry.
                reply_dropped = false;
                self.reap_offline(&id).await;
                continue;
            }
            match reply_rx.await {
                Ok(outcome) => return Ok(outcome),
                Err(_) => {
                    // Actor dropped the command unprocessed while idling out.
                    reply_dropped = true;
                    self.reap_offline(&id).await;
                    continue;
                }
            }
        }
        if reply_dropped {
            Err(DispatchError::ReplyDropped {
                machine: machine_id.to_string(),
            })
        } else {
            Err(DispatchError::MailboxClosed {
                machine: machine_id.to_string(),
            })
        }
    }

    /// Takes a machine offline now, as the idle path would.
    ///
    /// No-op for unknown or already-offline ids.
    pub async fn mark_offline(&self, machine_id: &str) {
        let tx = self.live_sender(machine_id).await;
        if let Some(tx) = tx {
            let _ = tx.send(Command::GoOffline).await;
        }
    }

    /// Online machines with their current states, at call time.
    pub async fn list_active(&self) -> Vec<MachineInfo> {
        self.list(true).await
    }

    /// Offline machines with their preserved states, at call time.
    pub async fn list_offline(&self) -> Vec<MachineInfo> {
        self.list(false).await
    }

    /// Snapshot of the registry-wide state.
    pub async fn registry_state(&self) -> RegistryStateSnapshot {
        let machines = self.machines.read().await;
        let mut active = Vec::new();
        let mut offline = Vec::new();
        for (id, slot) in machines.iter() {
            if slot.runtime.is_some() {
                active.push(id.to_string());
            } else {
                offline.push(id.to_string());
            }
        }
        active.sort_unstable();
        offline.sort_unstable();
        RegistryStateSnapshot {
            debug_mode: self.flags.debug_mode(),
            machine_count: machines.len(),
            active_machines: active,
            offline_machines: offline,
        }
    }

    /// Enables or disables debug mode for subsequent records.
    pub fn set_debug_mode(&self, on: bool) {
        self.flags.set_debug_mode(on);
    }

    /// Sets the 1-in-N sampling denominator for subsequent records.
    pub fn set_sampling_denominator(&self, n: u64) {
        self.flags.set_sampling_denominator(n);
    }

    /// Recorded history of one machine.
    pub fn history_of(&self, machine_id: &str) -> Vec<TransitionRecord> {
        self.recorder.history_of(machine_id)
    }

    /// Current (or last known) state of one machine, if it exists.
    pub async fn current_state_of(&self, machine_id: &str) -> Option<Arc<str>> {
        let machines = self.machines.read().await;
        machines.get(machine_id).map(|slot| slot.cell.load().0)
    }

    /// The history recorder (shared).
    pub fn recorder(&self) -> &HistoryRecorder {
        &self.recorder
    }

    /// Registers an observer for live pushes.
    pub fn observe(&self, observer: Arc<dyn Observe>) -> ObserverId {
        self.observers.register(observer)
    }

    /// Detaches a previously registered observer.
    pub fn unobserve(&self, id: ObserverId) {
        self.observers.unregister(id);
    }

    /// The internal event bus (for custom listeners and tests).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The runtime configuration this registry was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Cancels every actor and waits for them to exit.
    ///
    /// Offline snapshots and recorded history remain readable afterwards.
    pub async fn shutdown(&self) {
        self.root_token.cancel();
        let handles: Vec<(Arc<str>, ActorHandle)> = {
            let mut machines = self.machines.write().await;
            machines
                .iter_mut()
                .filter_map(|(id, slot)| slot.runtime.take().map(|h| (id.clone(), h)))
                .collect()
        };
        for (id, handle) in handles {
            handle.cancel.cancel();
            if handle.join.await.is_err() {
                log::warn!("machine actor panicked during shutdown: {id}");
            }
        }
    }

    // ---------------------------
    // Helpers
    // ---------------------------

    async fn live_sender(&self, machine_id: &str) -> Option<mpsc::Sender<Command>> {
        let machines = self.machines.read().await;
        machines
            .get(machine_id)
            .and_then(|slot| slot.runtime.as_ref())
            .map(|h| h.tx.clone())
    }

    /// Spawns an actor for `id`, fresh or rehydrated from its cell.
    async fn spawn_machine(&self, id: &Arc<str>) -> mpsc::Sender<Command> {
        let mut machines = self.machines.write().await;

        // Lost the race to another dispatcher: reuse its actor.
        if let Some(tx) = machines
            .get(id)
            .and_then(|slot| slot.runtime.as_ref())
            .map(|h| h.tx.clone())
        {
            return tx;
        }

        let slot = machines.entry(id.clone()).or_insert_with(|| MachineSlot {
            cell: Arc::new(MachineCell::new(self.def.start_state().clone())),
            runtime: None,
        });
        let (state, steps) = slot.cell.load();
        let boot = if steps == 0 {
            Boot::Fresh
        } else {
            log::info!("rehydrating machine {id} in state {state} at step {steps}");
            Boot::Rehydrated { state, steps }
        };

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let actor = MachineActor {
            id: id.clone(),
            def: self.def.clone(),
            boot,
            bus: self.bus.clone(),
            recorder: self.recorder.clone(),
            cell: slot.cell.clone(),
            timing: ActorTiming {
                idle_timeout: self.cfg.idle_timeout,
                countdown_tick: self.cfg.countdown_tick,
            },
        };
        let cancel = self.root_token.child_token();
        let join = tokio::spawn(actor.run(rx, cancel.clone()));
        slot.runtime = Some(ActorHandle {
            tx: tx.clone(),
            cancel,
            join,
        });
        tx
    }

    /// Drops the runtime handle of an actor that went offline.
    async fn reap_offline(&self, machine_id: &str) {
        let handle = {
            let mut machines = self.machines.write().await;
            machines
                .get_mut(machine_id)
                .and_then(|slot| slot.runtime.take())
        };
        if let Some(handle) = handle {
            if handle.join.await.is_err() {
                log::warn!("machine actor panicked: {machine_id}");
            }
        }
    }

    async fn list(&self, online: bool) -> Vec<MachineInfo> {
        let machines = self.machines.read().await;
        let mut out: Vec<MachineInfo> = machines
            .iter()
            .filter(|(_, slot)| slot.runtime.is_some() == online)
            .map(|(id, slot)| {
                let (state, _) = slot.cell.load();
                MachineInfo {
                    id: id.clone(),
                    kind: self.def.kind().clone(),
                    state,
                }
            })
            .collect();
        out.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
