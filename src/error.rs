//! Error types used by the registry and the protocol layer.
//!
//! This module defines two error enums:
//!
//! - [`DispatchError`] — infrastructure failures while routing an event to a
//!   machine actor. An event that is merely invalid for the current state is
//!   **not** an error; it surfaces as
//!   [`DispatchOutcome::Rejected`](crate::DispatchOutcome).
//! - [`ProtocolError`] — failures decoding an inbound observer frame. The
//!   frame is dropped and the connection stays open.
//!
//! Both types provide `as_label()` for logs/metrics. No variant is fatal to
//! the process.

use thiserror::Error;

/// Errors raised while routing an event to a machine actor.
///
/// These indicate the actor infrastructure failed, not that the event was
/// semantically invalid. Callers may simply retry: the registry rehydrates
/// the machine on the next dispatch.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The target actor's mailbox closed while the event was in flight.
    #[error("mailbox closed for machine {machine}")]
    MailboxClosed {
        /// Id of the machine the event was addressed to.
        machine: String,
    },

    /// The actor dropped the reply channel before answering.
    #[error("reply dropped by machine {machine}")]
    ReplyDropped {
        /// Id of the machine the event was addressed to.
        machine: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::MailboxClosed { .. } => "dispatch_mailbox_closed",
            DispatchError::ReplyDropped { .. } => "dispatch_reply_dropped",
        }
    }

    /// Id of the machine involved.
    pub fn machine(&self) -> &str {
        match self {
            DispatchError::MailboxClosed { machine } => machine,
            DispatchError::ReplyDropped { machine } => machine,
        }
    }
}

/// Errors raised while decoding an inbound observer/client frame.
///
/// serde reports unknown actions and missing fields alike through the
/// wrapped decode error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match any known action.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) => "protocol_malformed",
        }
    }
}
