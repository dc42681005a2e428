use std::sync::{Arc, Mutex};

use nbiot_config::{SchedulerPolicy, SharedConfig, StackConfig};
use nbiot_core::nbiot_entities::NbIotEntity;
use nbiot_core::{Sap, SubframeTime};
use nbiot_entities::mac::{HarqOutcomeEvent, MacEnb, MacObserver, ScheduleDecision};
use nbiot_entities::{MessageRouter, NbIotEntityTrait};
use nbiot_saps::sapmsg::{SapMsg, SapMsgInner};

use super::sink::Sink;

/// Creates a default config for testing. It can still be modified as needed
/// before passing it to the ComponentTest constructor
pub fn default_test_config(scheduler: SchedulerPolicy) -> StackConfig {
    let mut cfg = StackConfig::new(scheduler);
    cfg.cell.max_ues = 16;
    cfg.harq.num_processes = 2;
    cfg.harq.max_transmissions = 4;
    cfg.harq.retx_delay_subframes = 4;
    cfg.mac.rar_delay_subframes = 3;
    cfg
}

/// Observer that keeps everything it is told, shared with the test body
#[derive(Clone, Default)]
pub struct Recorder {
    pub decisions: Arc<Mutex<Vec<ScheduleDecision>>>,
    pub outcomes: Arc<Mutex<Vec<HarqOutcomeEvent>>>,
}

impl Recorder {
    pub fn decisions(&self) -> Vec<ScheduleDecision> {
        self.decisions.lock().unwrap().clone()
    }

    pub fn outcomes(&self) -> Vec<HarqOutcomeEvent> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl MacObserver for Recorder {
    fn on_schedule_decision(&mut self, decision: &ScheduleDecision) {
        self.decisions.lock().unwrap().push(decision.clone());
    }

    fn on_harq_outcome(&mut self, event: &HarqOutcomeEvent) {
        self.outcomes.lock().unwrap().push(event.clone());
    }
}

/// Infrastructure for testing the MAC against sinks standing in for PHY, RLC and RRC
pub struct ComponentTest {
    pub config: SharedConfig,
    pub router: MessageRouter,
    pub sinks: Vec<NbIotEntity>,
    start_time: SubframeTime,
}

impl ComponentTest {

    pub fn new(config: StackConfig, start_time: Option<SubframeTime>) -> Self {
        let shared_config = SharedConfig::from_config(config).expect("test config must be valid");
        let mut mr = MessageRouter::new(shared_config.clone());

        let start_time = start_time.unwrap_or_default();
        mr.set_time(start_time);

        Self {
            config: shared_config,
            router: mr,
            sinks: vec![],
            start_time,
        }
    }

    pub fn get_shared_config(&self) -> SharedConfig {
        self.config.clone()
    }

    pub fn populate_entities(&mut self, components: Vec<NbIotEntity>, sinks: Vec<NbIotEntity>) {
        for component in components.iter() {
            match component {
                NbIotEntity::Mac => {
                    let mut mac = MacEnb::new(self.config.clone()).expect("MAC config must be valid");
                    mac.set_time(self.start_time);
                    self.register_entity(mac);
                }
                _ => {
                    panic!("Component not implemented: {:?}", component);
                }
            }
        }

        // Create sinks for debugging / message collection
        for sink in sinks.iter() {
            assert!(!self.sinks.contains(sink), "Sink already exists: {:?}", sink);
            assert!(self.router.get_entity(*sink).is_none(), "Sink already registered as entity: {:?}", sink);

            self.sinks.push(*sink);
            self.register_entity(Sink::new(*sink));
        }
    }

    pub fn register_entity<T: 'static + NbIotEntityTrait>(&mut self, entity: T) {
        self.router.register_entity(Box::new(entity));
    }

    /// The MAC under test
    pub fn mac(&mut self) -> &mut MacEnb {
        self.router.get_entity(NbIotEntity::Mac)
            .and_then(|e| e.as_any_mut().downcast_mut::<MacEnb>())
            .expect("MAC not registered")
    }

    pub fn time(&self) -> SubframeTime {
        self.router.time()
    }

    pub fn run_stack(&mut self, num_ticks: Option<usize>) {
        self.router.run_stack(num_ticks, None);
    }

    pub fn submit_message(&mut self, message: SapMsg) {
        self.router.submit_message(message);
    }

    /// Submits a primitive from `src` to the MAC, stamped with the current time
    pub fn submit_to_mac(&mut self, sap: Sap, src: NbIotEntity, msg: SapMsgInner) {
        let ts = self.router.time();
        self.submit_message(SapMsg::new(sap, src, NbIotEntity::Mac, ts, msg));
    }

    pub fn deliver_all_messages(&mut self) {
        self.router.deliver_all_messages();
    }

    pub fn dump_sinks(&mut self) -> Vec<SapMsg> {
        let mut msgs = vec![];
        for sink in self.sinks.iter() {
            if let Some(component) = self.router.get_entity(*sink) {
                if let Some(sink) = component.as_any_mut().downcast_mut::<Sink>() {
                    let mut sink_msgs = sink.take_msgqueue();
                    msgs.append(&mut sink_msgs);
                }
            }
        }
        msgs
    }
}
