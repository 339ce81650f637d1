//! # Observer trait.
//!
//! [`Observe`] is the extension point for anything that wants live pushes:
//! monitor sessions, log writers, metrics exporters.
//!
//! Each registered observer gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-observer bounded queue** (capacity via [`Observe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Rules
//! - A slow observer only affects its own queue.
//! - Queue overflow drops the event **for this observer only**.
//! - Events are processed sequentially (FIFO) per observer, so per-machine
//!   emission order is preserved end to end.
//! - Observers never block publishers or each other.

use async_trait::async_trait;

use crate::events::MonitorEvent;

/// Receiver of live monitoring pushes.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, never in the publisher context.
    /// Events arrive in FIFO order for this observer.
    async fn on_event(&self, event: &MonitorEvent);

    /// Name used in logs when this observer drops events or panics.
    ///
    /// Prefer short, descriptive names (e.g. "session-42", "log").
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity for this observer (clamped to >= 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
