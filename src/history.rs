//! # Sampled transition history.
//!
//! [`HistoryRecorder`] keeps one append-only log per machine and decides,
//! per applied transition, whether it is persisted:
//!
//! ```text
//! record(&record)
//!   ├─► debug mode on          → keep
//!   ├─► step 1 (Initial)       → keep (every history starts at step 1)
//!   ├─► (step - 1) % N == 0    → keep (deterministic 1-in-N)
//!   └─► otherwise              → drop (still applied, still broadcast)
//! ```
//!
//! ## Rules
//! - Sampling governs **persisted history only**; live broadcast is
//!   unconditional and handled elsewhere.
//! - Logs are append-only and never mutated in place.
//! - Flag changes affect subsequent records only; no retroactive
//!   resampling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::machine::TransitionRecord;
use crate::registry::RegistryFlags;

#[derive(Default)]
struct MachineLog {
    records: Vec<TransitionRecord>,
    applied: u64,
}

/// Per-machine transition logs under the registry's sampling policy.
///
/// Thread-safe and cloneable; clones share the same logs.
#[derive(Clone)]
pub struct HistoryRecorder {
    flags: Arc<RegistryFlags>,
    logs: Arc<RwLock<HashMap<Arc<str>, MachineLog>>>,
}

impl HistoryRecorder {
    /// Creates a recorder governed by the given flags.
    pub fn new(flags: Arc<RegistryFlags>) -> Self {
        Self {
            flags,
            logs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Offers one applied transition to the recorder.
    ///
    /// Returns whether this particular record was kept.
    pub fn record(&self, record: &TransitionRecord) -> bool {
        let mut logs = self.logs.write().expect("history lock poisoned");
        let log = logs.entry(record.machine_id.clone()).or_default();
        log.applied += 1;

        let keep = self.flags.debug_mode()
            || record.step_number == 1
            || (record.step_number - 1) % self.flags.sampling_denominator() == 0;
        if keep {
            log.records.push(record.clone());
        } else {
            log::debug!(
                "sampled out: machine={} step={}",
                record.machine_id,
                record.step_number
            );
        }
        keep
    }

    /// Recorded history of one machine, in application order.
    pub fn history_of(&self, machine_id: &str) -> Vec<TransitionRecord> {
        let logs = self.logs.read().expect("history lock poisoned");
        logs.get(machine_id)
            .map(|l| l.records.clone())
            .unwrap_or_default()
    }

    /// Number of transitions offered for one machine (recorded or not).
    pub fn applied_count(&self, machine_id: &str) -> u64 {
        let logs = self.logs.read().expect("history lock poisoned");
        logs.get(machine_id).map(|l| l.applied).unwrap_or(0)
    }

    /// Number of transitions actually persisted for one machine.
    pub fn recorded_count(&self, machine_id: &str) -> u64 {
        let logs = self.logs.read().expect("history lock poisoned");
        logs.get(machine_id).map(|l| l.records.len() as u64).unwrap_or(0)
    }
}
