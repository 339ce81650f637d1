//! # Outbound push messages.
//!
//! [`PushMessage`] encodes everything the server pushes to a connected
//! observer, tagged by `type`:
//!
//! ```json
//! {"type":"STATE_CHANGE","machineId":"call-001","stateBefore":"IDLE",
//!  "stateAfter":"RINGING","eventName":"IncomingCall", ...}
//! {"type":"TIMEOUT_COUNTDOWN","machineId":"call-001","remainingSeconds":30}
//! ```
//!
//! Exactly one `STATE_CHANGE` frame corresponds to each accepted dispatch;
//! rejected events produce none.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::{MonitorEvent, MonitorEventKind};
use crate::machine::{EntryStatus, TransitionRecord};
use crate::registry::{MachineInfo, RegistryStateSnapshot};
use crate::treeview::TreeViewSnapshot;

/// Machine entry in list pushes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMachine {
    /// Machine id.
    pub id: Arc<str>,
    /// Machine type name.
    #[serde(rename = "type")]
    pub kind: Arc<str>,
    /// Current (or last known, for offline machines) state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Arc<str>>,
}

impl From<MachineInfo> for WireMachine {
    fn from(info: MachineInfo) -> Self {
        Self {
            id: info.id,
            kind: info.kind,
            state: Some(info.state),
        }
    }
}

/// One outbound frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// A machine applied a transition.
    #[serde(rename = "STATE_CHANGE", rename_all = "camelCase")]
    StateChange {
        machine_id: Arc<str>,
        state_before: Arc<str>,
        state_after: Arc<str>,
        event_name: Arc<str>,
        step_number: u64,
        timestamp: DateTime<Utc>,
        entry_action_status: EntryStatus,
    },

    /// Per-state timeout countdown tick.
    #[serde(rename = "TIMEOUT_COUNTDOWN", rename_all = "camelCase")]
    TimeoutCountdown {
        machine_id: Arc<str>,
        remaining_seconds: u64,
    },

    /// Outcome of an explicit FIRE_EVENT / SEND_EVENT request.
    #[serde(rename = "EVENT_FIRED", rename_all = "camelCase")]
    EventFired {
        machine_id: Arc<str>,
        event_type: Arc<str>,
        success: bool,
    },

    /// A machine was created or rehydrated.
    #[serde(rename = "MACHINE_REGISTERED", rename_all = "camelCase")]
    MachineRegistered { machine_id: Arc<str> },

    /// A machine went offline.
    #[serde(rename = "MACHINE_UNREGISTERED", rename_all = "camelCase")]
    MachineUnregistered { machine_id: Arc<str> },

    /// Current state of one machine (query response).
    #[serde(rename = "CURRENT_STATE", rename_all = "camelCase")]
    CurrentState {
        machine_id: Arc<str>,
        current_state: Arc<str>,
    },

    /// Active machines (response to GET_MACHINES).
    #[serde(rename = "MACHINES_LIST", rename_all = "camelCase")]
    MachinesList { machines: Vec<WireMachine> },

    /// Offline machines (response to GET_OFFLINE_MACHINES).
    #[serde(rename = "OFFLINE_MACHINES_LIST", rename_all = "camelCase")]
    OfflineMachinesList { machines: Vec<WireMachine> },

    /// Registry-state snapshot (response to GET_REGISTRY_STATE).
    #[serde(rename = "REGISTRY_STATE", rename_all = "camelCase")]
    RegistryState {
        debug_mode: bool,
        machine_count: usize,
        active_machines: Vec<String>,
        offline_machines: Vec<String>,
    },

    /// New tree-view snapshot for this session.
    #[serde(rename = "TREEVIEW_STORE_UPDATE", rename_all = "camelCase")]
    TreeViewStoreUpdate { store: TreeViewSnapshot },
}

impl PushMessage {
    /// Builds the `STATE_CHANGE` frame for one transition record.
    pub fn state_change(record: &TransitionRecord) -> Self {
        PushMessage::StateChange {
            machine_id: record.machine_id.clone(),
            state_before: record.from_state.clone(),
            state_after: record.to_state.clone(),
            event_name: record.event_name.clone(),
            step_number: record.step_number,
            timestamp: record.timestamp,
            entry_action_status: record.entry_action_status.clone(),
        }
    }

    /// Builds the registry-state frame from a snapshot.
    pub fn registry_state(snap: RegistryStateSnapshot) -> Self {
        PushMessage::RegistryState {
            debug_mode: snap.debug_mode,
            machine_count: snap.machine_count,
            active_machines: snap.active_machines,
            offline_machines: snap.offline_machines,
        }
    }

    /// Converts a bus event into its push frame.
    ///
    /// `EventRejected` yields `None`: rejections are reported only as
    /// `EVENT_FIRED{success:false}` to the requester, never broadcast.
    pub fn from_event(event: &MonitorEvent) -> Option<Self> {
        match event.kind {
            MonitorEventKind::StateChanged => {
                event.record.as_ref().map(PushMessage::state_change)
            }
            MonitorEventKind::TimeoutCountdown => Some(PushMessage::TimeoutCountdown {
                machine_id: event.machine.clone()?,
                remaining_seconds: event.remaining?,
            }),
            MonitorEventKind::MachineRegistered => Some(PushMessage::MachineRegistered {
                machine_id: event.machine.clone()?,
            }),
            MonitorEventKind::MachineUnregistered => Some(PushMessage::MachineUnregistered {
                machine_id: event.machine.clone()?,
            }),
            MonitorEventKind::EventRejected => None,
        }
    }
}
