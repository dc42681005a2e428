use as_any::AsAny;
use nbiot_core::{SubframeTime, nbiot_entities::NbIotEntity};
use nbiot_config::SharedConfig;
use nbiot_saps::SapMsg;
use crate::MessageQueue;

/// Trait for stack entities
/// Used by MessageRouter for passing messages between entities
pub trait NbIotEntityTrait: Send + AsAny {
    /// Returns the entity type identifier
    fn entity(&self) -> NbIotEntity;

    /// Handle incoming SAP primitive
    fn rx_prim(&mut self, queue: &mut MessageQueue, message: SapMsg);

    /// Update configuration (optional)
    fn set_config(&mut self, _config: SharedConfig) {}

    /// Called at the start of each subframe
    fn tick_start(&mut self, _queue: &mut MessageQueue, _ts: SubframeTime) { }

    /// Called at the end of each subframe
    fn tick_end(&mut self, _queue: &mut MessageQueue, _ts: SubframeTime) -> bool { false }
}
