//! # Illustrative call-session machine.
//!
//! The call flow used by demos and tests:
//!
//! ```text
//!            IncomingCall            Answer
//!   IDLE ───────────────► RINGING ──────────► CONNECTED
//!    ▲                      │ │                  │ │
//!    │        Hangup        │ │ 30s timeout      │ │ 30s timeout
//!    ├──────────────────────┘ ▼                  │ ▼
//!    │                      HUNGUP ◄─────────────┘
//!    │        Hangup          │
//!    └────────────────────────┘ IncomingCall → RINGING (reuse)
//! ```
//!
//! RINGING additionally accepts `SessionProgress` as a stay event (ring
//! counter in the handler, no transition). Domain action bodies live in the
//! state handlers; the engine only sees the table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::machine::{HandlerCtx, MachineDef, StateHandler};

/// Event dispatched when a new call arrives.
pub const INCOMING_CALL: &str = "IncomingCall";
/// Event dispatched when the callee picks up.
pub const ANSWER: &str = "Answer";
/// Event dispatched when either side hangs up.
pub const HANGUP: &str = "Hangup";
/// In-band ringing progress; a stay event, no transition.
pub const SESSION_PROGRESS: &str = "SessionProgress";

/// Call states.
pub const IDLE: &str = "IDLE";
/// Ringing at the destination.
pub const RINGING: &str = "RINGING";
/// Call connected and active.
pub const CONNECTED: &str = "CONNECTED";
/// Call over (answered too late or ended by timeout).
pub const HUNGUP: &str = "HUNGUP";

/// How long RINGING and CONNECTED may last before the call is torn down.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler for RINGING: logs the ring and counts progress events.
struct RingingActions {
    rings: AtomicU64,
}

#[async_trait]
impl StateHandler for RingingActions {
    async fn on_entry(&self, ctx: HandlerCtx<'_>) -> Result<(), String> {
        log::info!("phone is ringing: machine={}", ctx.machine_id);
        Ok(())
    }

    async fn on_exit(&self, ctx: HandlerCtx<'_>) {
        log::debug!("stopped ringing: machine={}", ctx.machine_id);
    }

    async fn on_stay(&self, ctx: HandlerCtx<'_>) {
        let n = self.rings.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("ring #{n}: machine={}", ctx.machine_id);
    }
}

/// Handler for CONNECTED: logs call start and end.
struct ConnectedActions;

#[async_trait]
impl StateHandler for ConnectedActions {
    async fn on_entry(&self, ctx: HandlerCtx<'_>) -> Result<(), String> {
        log::info!("call connected: machine={}", ctx.machine_id);
        Ok(())
    }

    async fn on_exit(&self, ctx: HandlerCtx<'_>) {
        log::info!("call disconnecting: machine={}", ctx.machine_id);
    }
}

/// Builds the call machine definition.
pub fn call_machine() -> Arc<MachineDef> {
    call_machine_with_timeout(CALL_TIMEOUT)
}

/// Builds the call machine with a custom ring/talk timeout (for tests).
pub fn call_machine_with_timeout(timeout: Duration) -> Arc<MachineDef> {
    MachineDef::builder("CallMachine", IDLE)
        .state(IDLE)
            .on(INCOMING_CALL, RINGING)
            .done()
        .state(RINGING)
            .on(ANSWER, CONNECTED)
            .on(HANGUP, IDLE)
            .stay(SESSION_PROGRESS)
            .timeout(timeout, HUNGUP)
            .handler(Arc::new(RingingActions {
                rings: AtomicU64::new(0),
            }))
            .done()
        .state(CONNECTED)
            .on(HANGUP, IDLE)
            .timeout(timeout, HUNGUP)
            .handler(Arc::new(ConnectedActions))
            .done()
        .state(HUNGUP)
            .on(INCOMING_CALL, RINGING)
            .done()
        .build()
}
