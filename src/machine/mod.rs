//! State machine definition, transition engine, and the per-machine actor.

pub(crate) mod actor;
mod definition;
mod engine;

pub use definition::{HandlerCtx, MachineDef, MachineDefBuilder, StateHandler, TimeoutSpec};
pub use engine::{
    ApplyOutcome, DispatchOutcome, EntryStatus, StateMachine, TransitionRecord, INITIAL_STATE,
    TIMEOUT_EVENT,
};
