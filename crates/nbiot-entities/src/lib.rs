pub mod entity_trait;
pub mod event_queue;
pub mod mac;
pub mod messagerouter;

// Re-export commonly used items from router
pub use entity_trait::NbIotEntityTrait;
pub use event_queue::{EventQueue, TimerHandle};
pub use messagerouter::{MessageQueue, MessageRouter};
