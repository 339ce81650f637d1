//! JSON wire protocol: inbound client requests, outbound push messages,
//! and the per-connection session that ties them to the registry.

mod push;
mod request;
mod session;

pub use push::{PushMessage, WireMachine};
pub use request::ClientRequest;
pub use session::Session;
