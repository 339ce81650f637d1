//! # Monitoring events emitted by machine actors and the registry.
//!
//! The [`MonitorEventKind`] enum classifies what happened; the
//! [`MonitorEvent`] struct carries the metadata each kind needs (machine id,
//! the full transition record, countdown remainder).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Because every event for one machine is published from that
//! machine's actor task, `seq` order is also per-machine application order.
//!
//! ## Example
//! ```rust
//! use statevisor::{MonitorEvent, MonitorEventKind};
//!
//! let ev = MonitorEvent::new(MonitorEventKind::MachineRegistered)
//!     .with_machine("call-007");
//!
//! assert_eq!(ev.kind, MonitorEventKind::MachineRegistered);
//! assert_eq!(ev.machine.as_deref(), Some("call-007"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::machine::TransitionRecord;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of monitoring events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEventKind {
    /// A machine applied a transition.
    ///
    /// Sets: `machine`, `record` (the full transition record), `at`, `seq`.
    /// Exactly one is published per accepted dispatch.
    StateChanged,

    /// A per-state timeout countdown tick.
    ///
    /// Sets: `machine`, `remaining` (whole seconds left), `at`, `seq`.
    TimeoutCountdown,

    /// A machine was created, or an offline machine was rehydrated.
    ///
    /// Sets: `machine`, `at`, `seq`.
    MachineRegistered,

    /// A machine went offline after its idle window elapsed.
    ///
    /// Sets: `machine`, `at`, `seq`.
    MachineUnregistered,

    /// An event was rejected because the current state does not accept it.
    ///
    /// Sets: `machine`, `event_name`, `at`, `seq`. No transition, no record.
    EventRejected,
}

/// Monitoring event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs and wire messages)
/// - other optional fields are set depending on the [`MonitorEventKind`]
#[derive(Clone, Debug)]
pub struct MonitorEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: DateTime<Utc>,
    /// Event classification.
    pub kind: MonitorEventKind,

    /// Id of the machine involved, if applicable.
    pub machine: Option<Arc<str>>,
    /// Full transition record (only for `StateChanged`).
    pub record: Option<TransitionRecord>,
    /// Remaining whole seconds (only for `TimeoutCountdown`).
    pub remaining: Option<u64>,
    /// Name of the rejected event (only for `EventRejected`).
    pub event_name: Option<Arc<str>>,
}

impl MonitorEvent {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn new(kind: MonitorEventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: Utc::now(),
            kind,
            machine: None,
            record: None,
            remaining: None,
            event_name: None,
        }
    }

    /// Attaches a machine id.
    #[inline]
    pub fn with_machine(mut self, machine: impl Into<Arc<str>>) -> Self {
        self.machine = Some(machine.into());
        self
    }

    /// Attaches a transition record (also sets the machine id from it).
    #[inline]
    pub fn with_record(mut self, record: TransitionRecord) -> Self {
        self.machine = Some(record.machine_id.clone());
        self.record = Some(record);
        self
    }

    /// Attaches a countdown remainder in whole seconds.
    #[inline]
    pub fn with_remaining(mut self, secs: u64) -> Self {
        self.remaining = Some(secs);
        self
    }

    /// Attaches the name of a rejected event.
    #[inline]
    pub fn with_event_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.event_name = Some(name.into());
        self
    }
}
