//! Machine registry: instance ownership, event routing, shared flags.

mod core;
mod flags;

pub use self::core::{MachineInfo, Registry, RegistryStateSnapshot};
pub(crate) use self::core::MachineCell;
pub use flags::RegistryFlags;
