//! # Logging observer for debugging and demos.
//!
//! [`LogWriter`] reports events through the `log` facade in a compact
//! human-readable format.
//!
//! ## Output format
//! ```text
//! [state-change] machine=call-001 step=2 IDLE -> RINGING on IncomingCall
//! [countdown] machine=call-001 remaining=30s
//! [registered] machine=call-001
//! [unregistered] machine=call-001
//! [rejected] machine=call-001 event=Answer
//! ```

use async_trait::async_trait;

use crate::events::{MonitorEvent, MonitorEventKind};

use super::Observe;

/// Observer that logs every monitoring event.
///
/// Intended for development and demos; dashboards attach through the
/// protocol session instead.
pub struct LogWriter;

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &MonitorEvent) {
        match e.kind {
            MonitorEventKind::StateChanged => {
                if let Some(r) = &e.record {
                    log::info!(
                        "[state-change] machine={} step={} {} -> {} on {}",
                        r.machine_id,
                        r.step_number,
                        r.from_state,
                        r.to_state,
                        r.event_name
                    );
                }
            }
            MonitorEventKind::TimeoutCountdown => {
                log::debug!(
                    "[countdown] machine={:?} remaining={:?}s",
                    e.machine,
                    e.remaining
                );
            }
            MonitorEventKind::MachineRegistered => {
                log::info!("[registered] machine={:?}", e.machine);
            }
            MonitorEventKind::MachineUnregistered => {
                log::info!("[unregistered] machine={:?}", e.machine);
            }
            MonitorEventKind::EventRejected => {
                log::debug!(
                    "[rejected] machine={:?} event={:?}",
                    e.machine,
                    e.event_name
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
