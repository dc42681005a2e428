use nbiot_config::{ConfigError, HARQ_MAX_TRANSMISSIONS_MAX, HARQ_PROCESSES_MAX};
use nbiot_core::HarqProcessId;

/// Redundancy versions used for successive transmissions of one block
pub const RV_SEQUENCE: [u8; 4] = [0, 2, 3, 1];

/// A transport block buffered for retransmission, with the parameters it was first sent with
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarqBlock {
    pub mcs: u8,
    pub tbs_bits: u16,
    pub repetitions: u16,
    /// NPUSCH subcarriers for uplink blocks, 0 on the downlink
    pub subcarriers: u8,
    pub payload: Vec<u8>,
}

/// One stop-and-wait HARQ process
#[derive(Debug, Clone, Default)]
pub struct HarqEntity {
    pub active: bool,
    /// Retransmissions done so far, 0 for the first transmission
    pub attempt: u8,
    /// Set while the buffered block has only been sent once
    pub ndi: bool,
    pub block: HarqBlock,
}

impl HarqEntity {
    pub fn reset(&mut self) {
        self.active = false;
        self.attempt = 0;
        self.ndi = false;
        self.block = HarqBlock::default();
    }

    /// Redundancy version for the current attempt
    pub fn rv(&self) -> u8 {
        RV_SEQUENCE[self.attempt as usize % RV_SEQUENCE.len()]
    }

    pub fn tbs_bits(&self) -> u16 {
        self.block.tbs_bits
    }

    pub fn repetitions(&self) -> u16 {
        self.block.repetitions
    }
}

/// Fixed pool of HARQ processes for one UE in one direction
#[derive(Debug, Clone)]
pub struct HarqManager {
    processes: Vec<HarqEntity>,
    max_transmissions: u8,
}

impl HarqManager {
    pub fn new(num_processes: usize, max_transmissions: u8) -> Result<Self, ConfigError> {
        ConfigError::check_range("harq.num_processes", num_processes as i64, 1, HARQ_PROCESSES_MAX as i64)?;
        ConfigError::check_range("harq.max_transmissions", max_transmissions, 1, HARQ_MAX_TRANSMISSIONS_MAX)?;
        Ok(Self {
            processes: vec![HarqEntity::default(); num_processes],
            max_transmissions,
        })
    }

    pub fn num_processes(&self) -> usize {
        self.processes.len()
    }

    pub fn max_transmissions(&self) -> u8 {
        self.max_transmissions
    }

    /// First idle process, if any. New data must not be assigned when this returns None.
    pub fn get_available_process(&self) -> Option<HarqProcessId> {
        self.processes.iter()
            .position(|p| !p.active)
            .map(|idx| idx as HarqProcessId)
    }

    /// Stores a new transport block in process `id` and activates it with attempt 0.
    /// Any block still held by the process is discarded.
    pub fn start_transmission(&mut self, id: HarqProcessId, block: HarqBlock) -> Option<&HarqEntity> {
        let p = self.processes.get_mut(id as usize)?;
        p.reset();
        p.active = true;
        p.ndi = true;
        p.block = block;
        Some(p)
    }

    /// Success. Resets the process; a no-op if it was idle.
    pub fn process_ack(&mut self, id: HarqProcessId) {
        if let Some(p) = self.processes.get_mut(id as usize) {
            p.reset();
        }
    }

    /// Failure. Returns true if the block should be retransmitted; false if the process
    /// reached the transmission limit and gave up (the process is reset).
    /// Idle or unknown processes report false and stay untouched.
    pub fn process_nack(&mut self, id: HarqProcessId) -> bool {
        let Some(p) = self.processes.get_mut(id as usize) else {
            return false;
        };
        if !p.active {
            return false;
        }
        p.attempt += 1;
        p.ndi = false;
        if p.attempt >= self.max_transmissions {
            tracing::debug!("process_nack: pid {} reached {} transmissions, giving up", id, self.max_transmissions);
            p.reset();
            return false;
        }
        true
    }

    /// Force-clears a process regardless of its state
    pub fn reset_process(&mut self, id: HarqProcessId) {
        if let Some(p) = self.processes.get_mut(id as usize) {
            p.reset();
        }
    }

    pub fn reset_all(&mut self) {
        for p in self.processes.iter_mut() {
            p.reset();
        }
    }

    pub fn get(&self, id: HarqProcessId) -> Option<&HarqEntity> {
        self.processes.get(id as usize)
    }

    pub fn is_active(&self, id: HarqProcessId) -> bool {
        self.get(id).is_some_and(|p| p.active)
    }

    pub fn active_count(&self) -> usize {
        self.processes.iter().filter(|p| p.active).count()
    }
}
