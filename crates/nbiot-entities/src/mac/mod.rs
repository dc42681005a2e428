pub mod enb_mac;
pub mod error;
pub mod observer;
pub mod subcomp;

pub use enb_mac::MacEnb;
pub use error::MacError;
pub use observer::{HarqOutcome, HarqOutcomeEvent, MacObserver, MacStats, ScheduleDecision};
