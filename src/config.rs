//! # Runtime configuration.
//!
//! [`Config`] defines the registry's behavior: event-bus capacity, the
//! history sampling denominator, debug mode, the idle window after which a
//! quiet machine goes offline, and observer queue sizing.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use statevisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.sampling_denominator = 10;
//! cfg.idle_timeout = Duration::from_secs(120);
//!
//! assert_eq!(cfg.sampling_denominator, 10);
//! ```

use std::time::Duration;

/// Global configuration for the machine registry and monitoring pipeline.
///
/// Controls bus capacity, history sampling, idle-offline behavior, and
/// per-observer queue sizing.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the internal broadcast bus.
    pub bus_capacity: usize,
    /// Persist roughly 1 of every N applied transitions (1 = all).
    ///
    /// Ignored while debug mode is on. Clamped to a minimum of 1.
    pub sampling_denominator: u64,
    /// Force full transition persistence regardless of the sampling rate.
    pub debug_mode: bool,
    /// How long a machine may sit without events before it goes offline.
    pub idle_timeout: Duration,
    /// Interval between timeout countdown pushes.
    pub countdown_tick: Duration,
    /// Bounded queue capacity for a session's pushes: both its observer
    /// registration and its outbound frame channel.
    pub observer_queue_capacity: usize,
    /// Machine id used by shorthand session actions with no explicit target.
    pub default_machine_id: String,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `bus_capacity = 1024`
    /// - `sampling_denominator = 1` (record everything)
    /// - `debug_mode = false`
    /// - `idle_timeout = 60s`
    /// - `countdown_tick = 1s`
    /// - `observer_queue_capacity = 1024`
    /// - `default_machine_id = "call-001"`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            sampling_denominator: 1,
            debug_mode: false,
            idle_timeout: Duration::from_secs(60),
            countdown_tick: Duration::from_secs(1),
            observer_queue_capacity: 1024,
            default_machine_id: "call-001".to_string(),
        }
    }
}
