//! # statevisor
//!
//! **Statevisor** runs many independent, timeout-aware finite-state-machine
//! instances (call sessions, in the bundled demo) and exposes their live
//! behavior to connected observers through a push-based monitoring channel.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  dispatch()  │   │  dispatch()  │   │ Session (in) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (process-scoped context)                                │
//! │  - machine map (id → actor mailbox + snapshot cell)               │
//! │  - RegistryFlags (debug mode, sampling denominator)               │
//! │  - HistoryRecorder (per-machine sampled logs)                     │
//! │  - Bus (broadcast) + ObserverSet (fan-out)                        │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!  │ MachineActor │  │ MachineActor │  │ MachineActor │   (one per
//!  │ (mailbox +   │  │              │  │              │    online
//!  │  timers)     │  │              │  │              │    machine)
//!  └┬─────────────┘  └┬─────────────┘  └┬─────────────┘
//!   │ publishes       │                 │
//!   │ StateChanged / TimeoutCountdown / MachineRegistered / ...
//!   ▼                 ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                      Bus (broadcast channel)                      │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                            ObserverSet (per-observer FIFO queues)
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                      LogWriter  Session1  Session2
//!                                 (pushes + per-session TreeViewStore)
//! ```
//!
//! ### Guarantees
//! - Events for one machine are applied **in arrival order**, never
//!   interleaved; distinct machines run in parallel (actor per machine, no
//!   global dispatch lock).
//! - Exactly one `STATE_CHANGE` push per accepted event; rejected events
//!   are silent no-ops.
//! - A state timeout that lost the race to an exiting event never fires:
//!   timers and events are multiplexed on the machine's own actor task.
//! - History sampling (1-in-N, debug override) governs persistence only;
//!   live pushes are unconditional.
//! - Idle machines go offline keeping identity, state, and step counter;
//!   the next event rehydrates them.
//!
//! ## Features
//! | Area            | Description                                         | Key types                                |
//! |-----------------|-----------------------------------------------------|------------------------------------------|
//! | **Definition**  | Declarative transition tables with handlers.        | [`MachineDef`], [`StateHandler`]         |
//! | **Dispatch**    | Per-machine serialized event routing.               | [`Registry`], [`DispatchOutcome`]        |
//! | **History**     | Sampled per-machine transition logs.                | [`HistoryRecorder`], [`TransitionRecord`]|
//! | **Monitoring**  | Live fan-out to observers.                          | [`Observe`], [`ObserverSet`], [`Bus`]    |
//! | **Tree view**   | Versioned per-session history projection.           | [`TreeViewStore`], [`TreeViewSnapshot`]  |
//! | **Protocol**    | JSON wire messages and per-connection sessions.     | [`ClientRequest`], [`PushMessage`], [`Session`] |
//!
//! ## Example
//! ```no_run
//! use statevisor::{call_machine, Config, Registry, Session};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let registry = Registry::new(Config::default(), call_machine::call_machine());
//!
//!     // One monitor connection.
//!     let (session, mut outbound) = Session::connect(registry.clone());
//!     tokio::spawn(async move {
//!         while let Some(frame) = outbound.recv().await {
//!             println!("push: {frame}");
//!         }
//!     });
//!
//!     // Drive a call.
//!     session
//!         .handle_text(r#"{"action":"INCOMING_CALL","callerNumber":"+15551234567"}"#)
//!         .await
//!         .unwrap();
//!     session.handle_text(r#"{"action":"ANSWER"}"#).await.unwrap();
//!     session.handle_text(r#"{"action":"HANGUP"}"#).await.unwrap();
//!
//!     registry.shutdown().await;
//! }
//! ```

pub mod call_machine;
mod config;
mod error;
mod events;
mod history;
mod machine;
mod observers;
mod protocol;
mod registry;
mod treeview;

pub use config::Config;
pub use error::{DispatchError, ProtocolError};
pub use events::{Bus, MonitorEvent, MonitorEventKind};
pub use history::HistoryRecorder;
pub use machine::{
    DispatchOutcome, EntryStatus, HandlerCtx, MachineDef, MachineDefBuilder, StateHandler,
    TimeoutSpec, TransitionRecord, INITIAL_STATE, TIMEOUT_EVENT,
};
pub use observers::{LogWriter, Observe, ObserverId, ObserverSet};
pub use protocol::{ClientRequest, PushMessage, Session, WireMachine};
pub use registry::{MachineInfo, Registry, RegistryFlags, RegistryStateSnapshot};
pub use treeview::{StateInstance, TreeViewSnapshot, TreeViewStore};
