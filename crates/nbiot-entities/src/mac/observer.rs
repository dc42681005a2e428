use nbiot_core::{Direction, HarqProcessId, Rnti, SubframeTime};

/// A transmission the MAC sent to the PHY in one subframe, new or retransmitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleDecision {
    pub ts: SubframeTime,
    pub direction: Direction,
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub mcs: u8,
    pub tbs_bits: u16,
    pub repetitions: u16,
    pub new_data: bool,
    pub sps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqOutcome {
    Ack,
    /// NACK with transmissions left; `attempt` is the retransmission about to be made
    Retry { attempt: u8 },
    /// NACK on the last allowed transmission, the block is dropped
    GaveUp,
    /// A periodic grant took over the process before the block was acknowledged, the
    /// block is dropped
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarqOutcomeEvent {
    pub ts: SubframeTime,
    pub direction: Direction,
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub outcome: HarqOutcome,
}

/// Taps into MAC activity for statistics and tracing. Every method defaults to a no-op.
pub trait MacObserver: Send {
    /// Called for every DL assignment and UL grant handed to the PHY
    fn on_schedule_decision(&mut self, _decision: &ScheduleDecision) {}

    /// Called for every ACK or NACK applied to an active process, and when a periodic
    /// grant drops an unacknowledged block
    fn on_harq_outcome(&mut self, _event: &HarqOutcomeEvent) {}

    /// Called when a random access response admits a new UE
    fn on_random_access(&mut self, _rnti: Rnti, _preamble_id: u8) {}
}

/// Counters kept by the MAC itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacStats {
    pub dl_new_tx: u64,
    pub ul_new_tx: u64,
    pub dl_retx: u64,
    pub ul_retx: u64,
    pub harq_acks: u64,
    pub dl_give_ups: u64,
    pub ul_give_ups: u64,
    /// UEs with pending data passed over because every HARQ process was busy
    pub harq_blocked: u64,
    /// UEs passed over because their first queued SDU does not fit the block their CQI allows
    pub dl_head_blocked: u64,
    /// Unacknowledged uplink blocks dropped for a periodic grant
    pub sps_superseded: u64,
    pub rar_sent: u64,
}

impl MacObserver for MacStats {
    fn on_schedule_decision(&mut self, d: &ScheduleDecision) {
        match (d.direction, d.new_data) {
            (Direction::Dl, true) => self.dl_new_tx += 1,
            (Direction::Dl, false) => self.dl_retx += 1,
            (Direction::Ul, true) => self.ul_new_tx += 1,
            (Direction::Ul, false) => self.ul_retx += 1,
        }
    }

    fn on_harq_outcome(&mut self, e: &HarqOutcomeEvent) {
        match (e.outcome, e.direction) {
            (HarqOutcome::Ack, _) => self.harq_acks += 1,
            (HarqOutcome::Retry { .. }, _) => {}
            (HarqOutcome::GaveUp, Direction::Dl) => self.dl_give_ups += 1,
            (HarqOutcome::GaveUp, Direction::Ul) => self.ul_give_ups += 1,
            (HarqOutcome::Superseded, _) => self.sps_superseded += 1,
        }
    }

    fn on_random_access(&mut self, _rnti: Rnti, _preamble_id: u8) {
        self.rar_sent += 1;
    }
}
