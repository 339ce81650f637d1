//! # Shared registry flags.
//!
//! Debug mode and the sampling denominator are read on every recorded
//! transition and written rarely, so they live in plain atomics rather than
//! behind the machine-map lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Process-wide recording flags shared by the registry and the history
/// recorder.
#[derive(Debug)]
pub struct RegistryFlags {
    debug_mode: AtomicBool,
    sampling_denominator: AtomicU64,
}

impl RegistryFlags {
    /// Creates flags with the given initial values. The denominator is
    /// clamped to a minimum of 1.
    pub fn new(debug_mode: bool, sampling_denominator: u64) -> Self {
        Self {
            debug_mode: AtomicBool::new(debug_mode),
            sampling_denominator: AtomicU64::new(sampling_denominator.max(1)),
        }
    }

    /// True while debug mode forces full persistence.
    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Enables or disables debug mode. Affects subsequent records only.
    pub fn set_debug_mode(&self, on: bool) {
        self.debug_mode.store(on, Ordering::Relaxed);
    }

    /// Current 1-in-N sampling denominator (>= 1).
    pub fn sampling_denominator(&self) -> u64 {
        self.sampling_denominator.load(Ordering::Relaxed)
    }

    /// Sets the sampling denominator (clamped to >= 1). Affects subsequent
    /// records only; history is never resampled.
    pub fn set_sampling_denominator(&self, n: u64) {
        self.sampling_denominator.store(n.max(1), Ordering::Relaxed);
    }
}
