use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nbiot_config::SharedConfig;
use nbiot_core::{SubframeTime, nbiot_entities::NbIotEntity};
use nbiot_saps::SapMsg;

use crate::NbIotEntityTrait;
use crate::event_queue::{EventQueue, TimerHandle};

/// Primitives waiting for delivery, plus the ones held back for a later subframe.
/// Entities only ever see this queue, never the router.
pub struct MessageQueue {
    messages: VecDeque<SapMsg>,
    delayed: EventQueue<SapMsg>,
    /// Subframes elapsed since the router started
    now: u64,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            delayed: EventQueue::new(),
            now: 0,
        }
    }

    pub fn push_back(&mut self, message: SapMsg) {
        self.messages.push_back(message);
    }

    /// Delivers `message` at the start of the subframe `delay_subframes` from now.
    /// A delay of 0 is treated as 1; nothing is delivered into the subframe being processed.
    pub fn push_delayed(&mut self, message: SapMsg, delay_subframes: u32) -> TimerHandle {
        let due = self.now + delay_subframes.max(1) as u64;
        self.delayed.schedule(due, message)
    }

    /// Cancels a delayed message. Returns false if it was already delivered or cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.delayed.cancel(handle)
    }

    pub fn pop_front(&mut self) -> Option<SapMsg> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of delayed messages still waiting
    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    /// Moves every delayed message that is due into the normal queue, in due order
    fn release_due(&mut self) -> usize {
        let mut released = 0;
        while let Some(msg) = self.delayed.pop_due(self.now) {
            self.messages.push_back(msg);
            released += 1;
        }
        released
    }

    fn advance(&mut self) {
        self.now += 1;
    }
}

/// Owns the stack entities and drives them one subframe at a time
pub struct MessageRouter {
    _config: SharedConfig,
    entities: HashMap<NbIotEntity, Box<dyn NbIotEntityTrait>>,
    /// Registration order, which is also the order entities are ticked in
    tick_order: Vec<NbIotEntity>,
    msg_queue: MessageQueue,
    /// Primitives dropped because their destination was not registered
    undeliverable: u64,

    ts: SubframeTime,
}

impl MessageRouter {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            _config: config,
            entities: HashMap::new(),
            tick_order: Vec::new(),
            msg_queue: MessageQueue::new(),
            undeliverable: 0,
            ts: SubframeTime::default(),
        }
    }

    /// Sets the subframe the next tick runs in
    pub fn set_time(&mut self, ts: SubframeTime) {
        self.ts = ts;
    }

    pub fn time(&self) -> SubframeTime {
        self.ts
    }

    /// Registers an entity. A second entity of the same kind replaces the first.
    pub fn register_entity(&mut self, entity: Box<dyn NbIotEntityTrait>) {
        let kind = entity.entity();
        tracing::debug!("register_entity {:?}", kind);
        if self.entities.insert(kind, entity).is_some() {
            tracing::warn!("register_entity: replaced existing {:?}", kind);
        } else {
            self.tick_order.push(kind);
        }
    }

    pub fn get_entity(&mut self, kind: NbIotEntity) -> Option<&mut dyn NbIotEntityTrait> {
        self.entities.get_mut(&kind).map(|entity| entity.as_mut())
    }

    pub fn submit_message(&mut self, message: SapMsg) {
        tracing::debug!(ts = %self.ts, "submit_message {} on {:?}: {:?} -> {:?}", message.msg, message.sap, message.src, message.dest);
        self.msg_queue.push_back(message);
    }

    /// Delivers one queued message. Returns false if the queue was empty.
    pub fn deliver_message(&mut self) -> bool {
        let Some(message) = self.msg_queue.pop_front() else {
            return false;
        };
        tracing::trace!(ts = %self.ts, "deliver_message {} on {:?}: {:?} -> {:?}", message.msg, message.sap, message.src, message.dest);

        match self.entities.get_mut(&message.dest) {
            Some(entity) => entity.rx_prim(&mut self.msg_queue, message),
            None => {
                self.undeliverable += 1;
                tracing::warn!(ts = %self.ts, "deliver_message: no {:?} for {} from {:?}", message.dest, message.msg, message.src);
            }
        }
        true
    }

    /// Delivers until the queue is empty, including anything queued by the receivers
    pub fn deliver_all_messages(&mut self) {
        while self.deliver_message() {}
    }

    pub fn get_msgqueue_len(&self) -> usize {
        self.msg_queue.len()
    }

    pub fn get_delayed_len(&self) -> usize {
        self.msg_queue.delayed_len()
    }

    pub fn undeliverable_count(&self) -> u64 {
        self.undeliverable
    }

    /// Starts a subframe:
    /// - timers that became due are released and delivered
    /// - messages submitted since the last tick are delivered
    /// - every entity gets its tick_start, where the MAC schedules this subframe
    pub fn tick_start(&mut self) {
        tracing::debug!("--- subframe {} ----------------------------", self.ts);

        let released = self.msg_queue.release_due();
        if released > 0 {
            tracing::trace!(ts = %self.ts, "tick_start: released {} delayed messages", released);
        }
        self.deliver_all_messages();

        for kind in self.tick_order.iter() {
            if let Some(entity) = self.entities.get_mut(kind) {
                entity.tick_start(&mut self.msg_queue, self.ts);
            }
        }
        self.deliver_all_messages();
    }

    /// Runs every entity's tick_end, delivers what they produced and moves to the next subframe
    pub fn tick_end(&mut self) {
        for kind in self.tick_order.iter() {
            if let Some(entity) = self.entities.get_mut(kind) {
                entity.tick_end(&mut self.msg_queue, self.ts);
            }
        }
        self.deliver_all_messages();

        self.ts = self.ts.add_subframes(1);
        self.msg_queue.advance();
    }

    /// Runs the stack for `num_ticks` subframes, or forever if None. Stops early once
    /// `running` is cleared.
    pub fn run_stack(&mut self, num_ticks: Option<usize>, running: Option<Arc<AtomicBool>>) {
        let stop_requested = || running.as_ref().is_some_and(|r| !r.load(Ordering::SeqCst));

        let mut ticks: usize = 0;
        while num_ticks.is_none_or(|n| ticks < n) {
            if stop_requested() {
                tracing::info!("run_stack: stop requested after {} subframes", ticks);
                break;
            }
            self.tick_start();
            self.tick_end();
            ticks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbiot_config::SchedulerPolicy;
    use nbiot_core::{Direction, Rnti, Sap};
    use nbiot_saps::control::MacTimer;
    use nbiot_saps::sapmsg::SapMsgInner;

    /// Records the subframe each primitive arrived in
    struct Probe {
        kind: NbIotEntity,
        /// None until the tick that follows delivery fills it in
        arrivals: Vec<Option<SubframeTime>>,
    }

    impl NbIotEntityTrait for Probe {
        fn entity(&self) -> NbIotEntity {
            self.kind
        }

        fn rx_prim(&mut self, _queue: &mut MessageQueue, _message: SapMsg) {
            self.arrivals.push(None);
        }

        fn tick_start(&mut self, _queue: &mut MessageQueue, ts: SubframeTime) {
            for at in self.arrivals.iter_mut().filter(|at| at.is_none()) {
                *at = Some(ts);
            }
        }
    }

    fn timer(rnti: u16) -> SapMsg {
        let t = MacTimer::RetxDue { rnti: Rnti(rnti), direction: Direction::Dl, harq_process: 0 };
        SapMsg::new(Sap::Control, NbIotEntity::Mac, NbIotEntity::Mac, SubframeTime::default(), SapMsgInner::MacTimer(t))
    }

    fn router() -> MessageRouter {
        let mut r = MessageRouter::new(SharedConfig::new(SchedulerPolicy::RoundRobin).unwrap());
        r.register_entity(Box::new(Probe { kind: NbIotEntity::Mac, arrivals: vec![] }));
        r.set_time(SubframeTime::from_ms(1));
        r
    }

    fn seen(r: &mut MessageRouter) -> Vec<u64> {
        let probe = r.get_entity(NbIotEntity::Mac).unwrap().as_any_mut().downcast_mut::<Probe>().unwrap();
        probe.arrivals.iter().flatten().map(|at| at.to_ms()).collect()
    }

    #[test]
    fn test_delayed_delivery_and_cancel() {
        let mut r = router();
        let first = r.msg_queue.push_delayed(timer(1), 3);
        r.msg_queue.push_delayed(timer(2), 0);
        let cancelled = r.msg_queue.push_delayed(timer(3), 2);
        assert!(r.msg_queue.cancel(cancelled));
        assert_eq!(r.get_delayed_len(), 2);

        r.run_stack(Some(5), None);
        // Delay 0 behaves as 1
        assert_eq!(seen(&mut r), vec![2, 4]);
        assert!(!r.msg_queue.cancel(first));
        assert_eq!(r.time(), SubframeTime::from_ms(6));
    }

    #[test]
    fn test_undeliverable_counted() {
        let mut r = router();
        let mut msg = timer(1);
        msg.dest = NbIotEntity::Rrc;
        r.submit_message(msg);
        r.run_stack(Some(1), None);
        assert_eq!(r.undeliverable_count(), 1);
        assert!(seen(&mut r).is_empty());
    }

    #[test]
    fn test_stop_flag() {
        let mut r = router();
        let running = Arc::new(AtomicBool::new(false));
        r.run_stack(None, Some(running));
        assert_eq!(r.time(), SubframeTime::from_ms(1));
    }
}
