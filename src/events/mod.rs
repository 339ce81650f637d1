//! Internal monitoring events and the broadcast bus that carries them.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{MonitorEvent, MonitorEventKind};
