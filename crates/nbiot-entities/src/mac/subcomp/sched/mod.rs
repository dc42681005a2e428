//! Scheduling policies.
//!
//! Each subframe the MAC asks the installed [`Scheduler`] for at most `available_units`
//! downlink assignments and uplink grants. Policies pick UEs from the [`UeTable`] they
//! are handed for the call, choose link parameters and drain the downlink queue into
//! the assignment. HARQ storage and transmission stay with the MAC.

pub mod coverage_class;
pub mod link_adapt;
pub mod round_robin;
pub mod sps;

use nbiot_config::{SchedulerPolicy, StackConfig};
use nbiot_core::{Direction, HarqProcessId, Rnti, SubframeTime};

use super::tx_queue::QueuedSdu;
use super::ue_table::UeTable;
use link_adapt::{LinkParams, UL_SUBCARRIERS, dl_block_bytes};

pub use coverage_class::CoverageClassScheduler;
pub use round_robin::RoundRobinScheduler;
pub use sps::{SpsConfig, SpsScheduler, SpsStats};

/// One downlink scheduling decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlAssignment {
    pub rnti: Rnti,
    pub mcs: u8,
    pub tbs_bits: u16,
    pub repetitions: u16,
    pub rv: u8,
    pub new_data: bool,
    pub harq_process: HarqProcessId,
    /// SDUs taken from the UE's queue to fill the block
    pub sdus: Vec<QueuedSdu>,
}

/// One uplink scheduling decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UlGrant {
    pub rnti: Rnti,
    pub mcs: u8,
    pub tbs_bits: u16,
    pub subcarriers: u8,
    pub repetitions: u16,
    pub rv: u8,
    pub new_data: bool,
    pub harq_process: HarqProcessId,
    /// Issued from a semi-persistent allocation
    pub sps: bool,
    /// UE had a request or backlog when the grant was made
    pub had_pending_data: bool,
}

pub trait Scheduler: Send {
    fn policy(&self) -> SchedulerPolicy;

    fn schedule_downlink(&mut self, ues: &mut UeTable, now: SubframeTime, available_units: usize) -> Vec<DlAssignment>;

    fn schedule_uplink(&mut self, ues: &mut UeTable, now: SubframeTime, available_units: usize) -> Vec<UlGrant>;

    /// Drops any policy state kept for a UE that left
    fn ue_removed(&mut self, _rnti: Rnti) {}

    fn as_sps(&self) -> Option<&SpsScheduler> { None }

    fn as_sps_mut(&mut self) -> Option<&mut SpsScheduler> { None }
}

/// Builds the scheduler selected in the config
pub fn build_scheduler(cfg: &StackConfig) -> Box<dyn Scheduler> {
    match cfg.mac.scheduler {
        SchedulerPolicy::RoundRobin => Box::new(RoundRobinScheduler::new()),
        SchedulerPolicy::CoverageClass => Box::new(CoverageClassScheduler::new()),
        SchedulerPolicy::Sps => Box::new(SpsScheduler::new(cfg.sps.default_interval_ms, cfg.sps.default_subcarriers)),
    }
}

/// Whether `rnti` can take a new block in `dir` this subframe. On the downlink the head
/// SDU must also fit the block the UE's CQI allows, otherwise the UE is skipped so it
/// cannot hold up the others.
fn schedulable(ues: &mut UeTable, rnti: Rnti, dir: Direction) -> bool {
    match dir {
        Direction::Dl => {
            let Some(cqi) = ues.context(rnti).map(|ctx| ctx.cqi) else {
                return false;
            };
            ues.is_dl_schedulable(rnti, dl_block_bytes(cqi))
        }
        Direction::Ul => ues.is_eligible(rnti, dir),
    }
}

/// Fills a new downlink assignment for `rnti` from its queue. The UE must have been
/// found eligible, so a HARQ process is free. Returns None if nothing in the queue fits.
fn build_dl_assignment(ues: &mut UeTable, rnti: Rnti, params: LinkParams) -> Option<DlAssignment> {
    let harq_process = ues.free_process(rnti, Direction::Dl)?;
    let sdus = ues.drain_dl_queue(rnti, params.tbs_bytes());
    if sdus.is_empty() {
        tracing::warn!("build_dl_assignment: head SDU of {} does not fit {} bits", rnti, params.tbs_bits);
        return None;
    }
    Some(DlAssignment {
        rnti,
        mcs: params.mcs,
        tbs_bits: params.tbs_bits,
        repetitions: params.repetitions,
        rv: 0,
        new_data: true,
        harq_process,
        sdus,
    })
}

/// Builds a dynamic full-carrier uplink grant for an eligible UE
fn build_ul_grant(ues: &mut UeTable, rnti: Rnti, params: LinkParams) -> Option<UlGrant> {
    let harq_process = ues.free_process(rnti, Direction::Ul)?;
    let had_pending_data = ues.consume_ul_grant(rnti, params.tbs_bytes() as u32);
    Some(UlGrant {
        rnti,
        mcs: params.mcs,
        tbs_bits: params.tbs_bits,
        subcarriers: UL_SUBCARRIERS,
        repetitions: params.repetitions,
        rv: 0,
        new_data: true,
        harq_process,
        sps: false,
        had_pending_data,
    })
}
