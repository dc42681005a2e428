/// Custom definitions for stack control and timers
pub mod control;

/// RRC/MAC control
pub mod cmac;
/// MAC/RLC logical channel data
pub mod mac;
/// PHY/MAC transport channels
pub mod phy;
pub mod sapmsg;

pub use sapmsg::*;
