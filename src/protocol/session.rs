//! # Session: one connected observer/client.
//!
//! A [`Session`] is the transport-agnostic half of a monitor connection.
//! The transport (a websocket handler, a test harness) feeds inbound text
//! frames into [`Session::handle_text`] and drains outbound JSON frames
//! from the receiver returned by [`Session::connect`].
//!
//! ## Architecture
//! ```text
//! transport ──text──► Session::handle_text ──► ClientRequest ──► Registry ops
//!
//! Bus ──► ObserverSet ──► Session::on_event (worker task)
//!            │                 ├─► PushMessage ──► outbound queue ──► transport
//!            └─ per-session    └─► TreeViewStore (if StateChanged on the
//!               FIFO queue         selected machine → TREEVIEW_STORE_UPDATE)
//! ```
//!
//! ## Rules
//! - Malformed inbound frames are dropped with a warning; the connection
//!   stays open.
//! - The session's tree view and its version sequence are private to the
//!   session; other sessions are unaffected by selection changes.
//! - `close()` unregisters the observer; pending queued frames drain out.
//! - Shorthand call actions target the selected machine, falling back to
//!   [`Config::default_machine_id`](crate::Config).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::call_machine;
use crate::error::ProtocolError;
use crate::events::{MonitorEvent, MonitorEventKind};
use crate::observers::{Observe, ObserverId};
use crate::protocol::push::{PushMessage, WireMachine};
use crate::protocol::request::ClientRequest;
use crate::registry::Registry;
use crate::treeview::TreeViewStore;

/// One monitor connection's server-side state.
pub struct Session {
    registry: Arc<Registry>,
    out: mpsc::Sender<String>,
    treeview: Mutex<TreeViewStore>,
    observer_id: std::sync::OnceLock<ObserverId>,
}

impl Session {
    /// Creates a session, registers it for live pushes, and returns the
    /// outbound frame stream for the transport to drain.
    pub fn connect(registry: Arc<Registry>) -> (Arc<Self>, mpsc::Receiver<String>) {
        let capacity = registry.config().observer_queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let session = Arc::new(Self {
            registry: registry.clone(),
            out: tx,
            treeview: Mutex::new(TreeViewStore::new()),
            observer_id: std::sync::OnceLock::new(),
        });
        let id = registry.observe(session.clone());
        let _ = session.observer_id.set(id);
        (session, rx)
    }

    /// Detaches the session from the fan-out set.
    ///
    /// The machine registry and other sessions are unaffected.
    pub fn close(&self) {
        if let Some(id) = self.observer_id.get() {
            self.registry.unobserve(*id);
        }
    }

    /// Decodes and executes one inbound text frame.
    ///
    /// A malformed frame is dropped with a warning and reported back;
    /// callers keep the connection open, nothing here is fatal.
    pub async fn handle_text(&self, text: &str) -> Result<(), ProtocolError> {
        let request: ClientRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("malformed frame dropped: {e}");
                return Err(ProtocolError::Malformed(e));
            }
        };
        self.handle(request).await;
        Ok(())
    }

    /// Executes one decoded request.
    pub async fn handle(&self, request: ClientRequest) {
        match request {
            ClientRequest::IncomingCall { caller_number } => {
                let payload = caller_number
                    .map(|n| serde_json::json!({ "callerNumber": n }));
                self.shorthand(call_machine::INCOMING_CALL, payload).await;
            }
            ClientRequest::Answer => self.shorthand(call_machine::ANSWER, None).await,
            ClientRequest::Hangup => self.shorthand(call_machine::HANGUP, None).await,

            ClientRequest::FireEvent { machine_id, event } => {
                self.fire(&machine_id, &event, None).await;
            }
            ClientRequest::SendEvent {
                machine_id,
                event_type,
                payload,
            } => {
                self.fire(&machine_id, &event_type, payload).await;
            }

            ClientRequest::GetMachines => {
                let machines = self.registry.list_active().await;
                self.push(PushMessage::MachinesList {
                    machines: machines.into_iter().map(WireMachine::from).collect(),
                })
                .await;
            }
            ClientRequest::GetOfflineMachines => {
                let machines = self.registry.list_offline().await;
                self.push(PushMessage::OfflineMachinesList {
                    machines: machines.into_iter().map(WireMachine::from).collect(),
                })
                .await;
            }
            ClientRequest::GetRegistryState => {
                let snap = self.registry.registry_state().await;
                self.push(PushMessage::registry_state(snap)).await;
            }

            ClientRequest::TreeViewAction { machine_id }
            | ClientRequest::SelectMachine { machine_id } => {
                self.select(&machine_id).await;
            }
        }
    }

    /// Dispatches a shorthand call event to the session's machine.
    async fn shorthand(&self, event: &str, payload: Option<serde_json::Value>) {
        let target = {
            let view = self.treeview.lock().await;
            view.selected()
                .map(|s| s.to_string())
                .unwrap_or_else(|| self.registry.config().default_machine_id.clone())
        };
        if let Err(e) = self.registry.dispatch(&target, event, payload).await {
            log::warn!("shorthand dispatch failed: {} ({})", e, e.as_label());
        }
    }

    /// Dispatches an explicit event and reports the outcome.
    async fn fire(&self, machine_id: &str, event: &str, payload: Option<serde_json::Value>) {
        let success = match self.registry.dispatch(machine_id, event, payload).await {
            Ok(outcome) => outcome.accepted(),
            Err(e) => {
                log::warn!("dispatch failed: {} ({})", e, e.as_label());
                false
            }
        };
        self.push(PushMessage::EventFired {
            machine_id: machine_id.into(),
            event_type: event.into(),
            success,
        })
        .await;
        if success {
            if let Some(state) = self.registry.current_state_of(machine_id).await {
                self.push(PushMessage::CurrentState {
                    machine_id: machine_id.into(),
                    current_state: state,
                })
                .await;
            }
        }
    }

    /// Binds the tree view to a machine and pushes the rebuilt snapshot.
    async fn select(&self, machine_id: &str) {
        let history = self.registry.history_of(machine_id);
        let snapshot = {
            let mut view = self.treeview.lock().await;
            view.select(machine_id, &history)
        };
        self.push(PushMessage::TreeViewStoreUpdate { store: snapshot })
            .await;
        if let Some(state) = self.registry.current_state_of(machine_id).await {
            self.push(PushMessage::CurrentState {
                machine_id: machine_id.into(),
                current_state: state,
            })
            .await;
        }
    }

    /// Encodes and queues one outbound frame.
    async fn push(&self, message: PushMessage) {
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("failed to encode push frame: {e}");
                return;
            }
        };
        if self.out.send(frame).await.is_err() {
            log::debug!("session outbound closed, frame dropped");
        }
    }
}

#[async_trait]
impl Observe for Session {
    async fn on_event(&self, event: &MonitorEvent) {
        if let Some(message) = PushMessage::from_event(event) {
            self.push(message).await;
        }
        if event.kind == MonitorEventKind::StateChanged {
            if let Some(record) = &event.record {
                let update = {
                    let mut view = self.treeview.lock().await;
                    view.on_transition(record)
                };
                if let Some(snapshot) = update {
                    self.push(PushMessage::TreeViewStoreUpdate { store: snapshot })
                        .await;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "session"
    }

    fn queue_capacity(&self) -> usize {
        self.registry.config().observer_queue_capacity
    }
}
