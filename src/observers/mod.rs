//! Observer trait, fan-out set, and the built-in logging observer.

mod log;
mod observer;
mod set;

pub use self::log::LogWriter;
pub use observer::Observe;
pub use set::{ObserverId, ObserverSet};
