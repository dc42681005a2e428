use nbiot_core::nbiot_entities::NbIotEntity;
use nbiot_entities::{MessageQueue, NbIotEntityTrait};
use nbiot_saps::sapmsg::SapMsg;

/// Stand-in for an entity that is not under test.
/// Collects all received SapMsg messages for later inspection
pub struct Sink {
    component: NbIotEntity,
    msgqueue: Vec<SapMsg>,
}

impl Sink {
    pub fn new(component: NbIotEntity) -> Self {
        Self {
            component,
            msgqueue: vec![],
        }
    }

    pub fn take_msgqueue(&mut self) -> Vec<SapMsg> {
        std::mem::take(&mut self.msgqueue)
    }
}

impl NbIotEntityTrait for Sink {

    fn entity(&self) -> NbIotEntity {
        self.component
    }

    fn rx_prim(&mut self, _queue: &mut MessageQueue, message: SapMsg) {
        tracing::debug!(ts = %message.ts, "rx_prim: {}", message.msg);
        self.msgqueue.push(message);
    }
}
