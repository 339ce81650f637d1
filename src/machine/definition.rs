//! # Declarative machine definition.
//!
//! [`MachineDef`] is the transition table shared by every instance of one
//! machine type: per state, the accepted events and their target states,
//! optional "stay" events that run a handler without leaving the state, an
//! optional timeout (duration + target state), and an optional
//! [`StateHandler`] for entry/exit behavior.
//!
//! Per-state behavior is plugged in through a single polymorphic trait and
//! selected by the dispatch lookup, not by inheritance.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use statevisor::MachineDef;
//!
//! let def = MachineDef::builder("CallMachine", "IDLE")
//!     .state("IDLE")
//!         .on("IncomingCall", "RINGING")
//!         .done()
//!     .state("RINGING")
//!         .on("Answer", "CONNECTED")
//!         .on("Hangup", "IDLE")
//!         .timeout(Duration::from_secs(30), "HUNGUP")
//!         .done()
//!     .state("CONNECTED")
//!         .on("Hangup", "IDLE")
//!         .done()
//!     .state("HUNGUP")
//!         .done()
//!     .build();
//!
//! assert_eq!(def.target("IDLE", "IncomingCall").as_deref(), Some("RINGING"));
//! assert_eq!(def.target("IDLE", "Hangup"), None);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Context handed to state handlers.
///
/// Carries the machine id, the event that caused the hook to run, and the
/// event payload (if the client attached one).
pub struct HandlerCtx<'a> {
    /// Id of the machine instance.
    pub machine_id: &'a str,
    /// Name of the event being applied ("Timeout" for timeout transitions,
    /// "Initial" for instance creation).
    pub event: &'a str,
    /// Opaque payload attached by the client, if any.
    pub payload: Option<&'a serde_json::Value>,
}

/// Per-state behavior hooks.
///
/// Implementations hold the domain action bodies (ringing the phone,
/// writing a CDR, ...). The engine treats them as opaque: an entry failure
/// is captured in the transition record's entry status, never propagated —
/// the transition itself has already happened.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - `on_entry` errors are recorded, not retried.
#[async_trait]
pub trait StateHandler: Send + Sync + 'static {
    /// Runs after the machine has moved into the state.
    async fn on_entry(&self, ctx: HandlerCtx<'_>) -> Result<(), String> {
        let _ = ctx;
        Ok(())
    }

    /// Runs before the machine leaves the state.
    async fn on_exit(&self, ctx: HandlerCtx<'_>) {
        let _ = ctx;
    }

    /// Runs for a "stay" event: the event is accepted but the state does
    /// not change and no transition is recorded.
    async fn on_stay(&self, ctx: HandlerCtx<'_>) {
        let _ = ctx;
    }
}

/// Timeout declared on a state.
///
/// If the state is not exited within `after`, a synthetic
/// [`TIMEOUT_EVENT`](crate::machine::TIMEOUT_EVENT) transition to `target`
/// fires.
#[derive(Clone, Debug)]
pub struct TimeoutSpec {
    /// How long the machine may remain in the state.
    pub after: Duration,
    /// State entered when the timeout fires.
    pub target: Arc<str>,
}

/// One state's slice of the transition table.
struct StateDef {
    transitions: HashMap<Arc<str>, Arc<str>>,
    stay: HashSet<Arc<str>>,
    timeout: Option<TimeoutSpec>,
    handler: Option<Arc<dyn StateHandler>>,
}

/// Immutable transition table for one machine type.
///
/// Shared (`Arc`) across all instances; instances hold only their own
/// current state and counters.
pub struct MachineDef {
    kind: Arc<str>,
    start: Arc<str>,
    states: HashMap<Arc<str>, StateDef>,
}

impl MachineDef {
    /// Starts building a definition for machine type `kind` with the given
    /// start state.
    pub fn builder(kind: impl Into<Arc<str>>, start: impl Into<Arc<str>>) -> MachineDefBuilder {
        MachineDefBuilder {
            kind: kind.into(),
            start: start.into(),
            states: HashMap::new(),
        }
    }

    /// Machine type name (e.g. "CallMachine").
    pub fn kind(&self) -> &Arc<str> {
        &self.kind
    }

    /// The state every fresh instance enters first.
    pub fn start_state(&self) -> &Arc<str> {
        &self.start
    }

    /// Looks up the target state for `(state, event)`, if the transition
    /// table declares one.
    pub fn target(&self, state: &str, event: &str) -> Option<Arc<str>> {
        self.states.get(state)?.transitions.get(event).cloned()
    }

    /// True if `event` is declared as a stay event for `state`.
    pub fn is_stay(&self, state: &str, event: &str) -> bool {
        self.states
            .get(state)
            .map(|s| s.stay.contains(event))
            .unwrap_or(false)
    }

    /// Timeout declared on `state`, if any.
    pub fn timeout_of(&self, state: &str) -> Option<TimeoutSpec> {
        self.states.get(state)?.timeout.clone()
    }

    /// Handler attached to `state`, if any.
    pub fn handler_of(&self, state: &str) -> Option<Arc<dyn StateHandler>> {
        self.states.get(state)?.handler.clone()
    }
}

impl std::fmt::Debug for MachineDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDef")
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Fluent builder for [`MachineDef`].
pub struct MachineDefBuilder {
    kind: Arc<str>,
    start: Arc<str>,
    states: HashMap<Arc<str>, StateDef>,
}

impl MachineDefBuilder {
    /// Opens a state block. Close it with [`StateBuilder::done`].
    pub fn state(self, name: impl Into<Arc<str>>) -> StateBuilder {
        StateBuilder {
            builder: self,
            name: name.into(),
            def: StateDef {
                transitions: HashMap::new(),
                stay: HashSet::new(),
                timeout: None,
                handler: None,
            },
        }
    }

    /// Finalizes the definition.
    pub fn build(self) -> Arc<MachineDef> {
        debug_assert!(
            self.states.contains_key(&self.start),
            "start state must be declared"
        );
        Arc::new(MachineDef {
            kind: self.kind,
            start: self.start,
            states: self.states,
        })
    }
}

/// Builder scope for a single state.
pub struct StateBuilder {
    builder: MachineDefBuilder,
    name: Arc<str>,
    def: StateDef,
}

impl StateBuilder {
    /// Declares `event` as a transition to `target`.
    pub fn on(mut self, event: impl Into<Arc<str>>, target: impl Into<Arc<str>>) -> Self {
        self.def.transitions.insert(event.into(), target.into());
        self
    }

    /// Declares `event` as a stay event (handler runs, state unchanged).
    pub fn stay(mut self, event: impl Into<Arc<str>>) -> Self {
        self.def.stay.insert(event.into());
        self
    }

    /// Declares a timeout: leave for `target` if the state is not exited
    /// within `after`.
    pub fn timeout(mut self, after: Duration, target: impl Into<Arc<str>>) -> Self {
        self.def.timeout = Some(TimeoutSpec {
            after,
            target: target.into(),
        });
        self
    }

    /// Attaches entry/exit/stay behavior to the state.
    pub fn handler(mut self, handler: Arc<dyn StateHandler>) -> Self {
        self.def.handler = Some(handler);
        self
    }

    /// Closes the state block.
    pub fn done(mut self) -> MachineDefBuilder {
        self.builder.states.insert(self.name, self.def);
        self.builder
    }
}
