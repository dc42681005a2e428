use nbiot_config::SchedulerPolicy;
use nbiot_core::{CoverageClass, Direction, Rnti, SubframeTime};

use super::link_adapt::{dl_params, ul_params};
use super::{DlAssignment, Scheduler, UlGrant, build_dl_assignment, build_ul_grant, schedulable};
use crate::mac::subcomp::ue_table::UeTable;

const DL_REP_STEP: usize = 3;
const UL_REP_STEP: usize = 2;

/// Scheduling priority of a coverage class. Lower is served first, so the deepest
/// coverage class wins. There is no aging: under sustained load from CE2 UEs, CE0 UEs
/// are not served.
pub fn priority(cc: CoverageClass) -> u8 {
    match cc {
        CoverageClass::Ce2 => 1,
        CoverageClass::Ce1 => 2,
        CoverageClass::Ce0 => 3,
    }
}

/// Serves the eligible UE with the best coverage class priority, lowest RNTI on ties
#[derive(Debug, Default)]
pub struct CoverageClassScheduler;

impl CoverageClassScheduler {
    pub fn new() -> Self {
        Self
    }

    fn select(ues: &mut UeTable, dir: Direction) -> Option<Rnti> {
        let mut candidates: Vec<(u8, Rnti)> = Vec::new();
        for rnti in ues.rntis() {
            if !schedulable(ues, rnti, dir) {
                continue;
            }
            if let Some(ctx) = ues.context(rnti) {
                candidates.push((priority(ctx.coverage_class), rnti));
            }
        }
        // Stable, so RNTI order is kept within a priority level
        candidates.sort_by_key(|(prio, _)| *prio);
        candidates.first().map(|(_, rnti)| *rnti)
    }
}

impl Scheduler for CoverageClassScheduler {
    fn policy(&self) -> SchedulerPolicy {
        SchedulerPolicy::CoverageClass
    }

    fn schedule_downlink(&mut self, ues: &mut UeTable, _now: SubframeTime, available_units: usize) -> Vec<DlAssignment> {
        if available_units == 0 {
            return Vec::new();
        }
        let Some(rnti) = Self::select(ues, Direction::Dl) else {
            return Vec::new();
        };
        let Some(ctx) = ues.context(rnti) else {
            return Vec::new();
        };
        let params = dl_params(ctx.cqi, ctx.coverage_class, DL_REP_STEP);
        tracing::trace!("schedule_downlink: {} ({}) mcs {} reps {}", rnti, ctx.coverage_class, params.mcs, params.repetitions);
        build_dl_assignment(ues, rnti, params).into_iter().collect()
    }

    fn schedule_uplink(&mut self, ues: &mut UeTable, _now: SubframeTime, available_units: usize) -> Vec<UlGrant> {
        if available_units == 0 {
            return Vec::new();
        }
        let Some(rnti) = Self::select(ues, Direction::Ul) else {
            return Vec::new();
        };
        let Some(ctx) = ues.context(rnti) else {
            return Vec::new();
        };
        let params = ul_params(ctx.cqi, ctx.coverage_class, UL_REP_STEP);
        tracing::trace!("schedule_uplink: {} ({}) mcs {} reps {}", rnti, ctx.coverage_class, params.mcs, params.repetitions);
        build_ul_grant(ues, rnti, params).into_iter().collect()
    }
}
