use nbiot_config::SchedulerPolicy;
use nbiot_core::{Direction, Rnti, SubframeTime};

use super::link_adapt::{dl_params, ul_params};
use super::{DlAssignment, Scheduler, UlGrant, build_dl_assignment, build_ul_grant, schedulable};
use crate::mac::subcomp::ue_table::UeTable;

const DL_REP_STEP: usize = 2;
const UL_REP_STEP: usize = 1;

/// Serves one UE per direction per subframe, cycling through UEs in ascending RNTI
/// order from just after the last one served.
#[derive(Debug, Default)]
pub struct RoundRobinScheduler {
    last_dl: Option<Rnti>,
    last_ul: Option<Rnti>,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_served(&self, dir: Direction) -> Option<Rnti> {
        match dir {
            Direction::Dl => self.last_dl,
            Direction::Ul => self.last_ul,
        }
    }

    /// Next UE after `last` that is eligible in `dir`. The cursor is not touched.
    pub fn select(ues: &mut UeTable, last: Option<Rnti>, dir: Direction) -> Option<Rnti> {
        ues.round_robin_order(last)
            .into_iter()
            .find(|&rnti| schedulable(ues, rnti, dir))
    }
}

impl Scheduler for RoundRobinScheduler {
    fn policy(&self) -> SchedulerPolicy {
        SchedulerPolicy::RoundRobin
    }

    fn schedule_downlink(&mut self, ues: &mut UeTable, _now: SubframeTime, available_units: usize) -> Vec<DlAssignment> {
        if available_units == 0 {
            return Vec::new();
        }
        let Some(rnti) = Self::select(ues, self.last_dl, Direction::Dl) else {
            return Vec::new();
        };
        self.last_dl = Some(rnti);

        let Some(ctx) = ues.context(rnti) else {
            return Vec::new();
        };
        let params = dl_params(ctx.cqi, ctx.coverage_class, DL_REP_STEP);
        tracing::trace!("schedule_downlink: {} mcs {} tbs {}", rnti, params.mcs, params.tbs_bits);
        build_dl_assignment(ues, rnti, params).into_iter().collect()
    }

    fn schedule_uplink(&mut self, ues: &mut UeTable, _now: SubframeTime, available_units: usize) -> Vec<UlGrant> {
        if available_units == 0 {
            return Vec::new();
        }
        let Some(rnti) = Self::select(ues, self.last_ul, Direction::Ul) else {
            return Vec::new();
        };
        self.last_ul = Some(rnti);

        let Some(ctx) = ues.context(rnti) else {
            return Vec::new();
        };
        let params = ul_params(ctx.cqi, ctx.coverage_class, UL_REP_STEP);
        tracing::trace!("schedule_uplink: {} mcs {} tbs {}", rnti, params.mcs, params.tbs_bits);
        build_ul_grant(ues, rnti, params).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use nbiot_core::CoverageClass;

    use super::*;
    use crate::mac::subcomp::harq::HarqBlock;
    use crate::mac::subcomp::sched::test_util::*;

    fn ul_served(s: &mut RoundRobinScheduler, t: &mut UeTable) -> Option<Rnti> {
        let grants = s.schedule_uplink(t, SubframeTime::default(), 1);
        assert!(grants.len() <= 1);
        grants.first().map(|g| g.rnti)
    }

    #[test]
    fn test_uplink_cycle_a_b_c_a() {
        let mut t = table();
        let a = add(&mut t, 100, CoverageClass::Ce0);
        let b = add(&mut t, 200, CoverageClass::Ce2);
        let c = add(&mut t, 300, CoverageClass::Ce1);
        for r in [a, b, c] {
            fill_ul(&mut t, r);
        }
        let mut s = RoundRobinScheduler::new();

        let served: Vec<_> = (0..4).map(|_| ul_served(&mut s, &mut t)).collect();
        assert_eq!(served, vec![Some(a), Some(b), Some(c), Some(a)]);
    }

    #[test]
    fn test_downlink_fairness_full_cycles() {
        let mut t = table();
        let rntis: Vec<_> = (1..=5).map(|r| add(&mut t, r, CoverageClass::Ce0)).collect();
        for &r in &rntis {
            fill_dl(&mut t, r, 50);
        }
        let mut s = RoundRobinScheduler::new();

        let mut served = Vec::new();
        for _ in 0..10 {
            let a = s.schedule_downlink(&mut t, SubframeTime::default(), 1);
            assert_eq!(a.len(), 1);
            served.push(a[0].rnti);
        }
        let mut expected = rntis.clone();
        expected.extend(rntis.iter().copied());
        assert_eq!(served, expected);
    }

    #[test]
    fn test_skips_ues_without_demand_and_keeps_cursor_when_idle() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        let b = add(&mut t, 2, CoverageClass::Ce0);
        let c = add(&mut t, 3, CoverageClass::Ce0);
        t.context_mut(b).unwrap().scheduling_request(SubframeTime::default());
        let mut s = RoundRobinScheduler::new();

        assert_eq!(ul_served(&mut s, &mut t), Some(b));
        // SR consumed by the grant, nobody qualifies now
        assert_eq!(ul_served(&mut s, &mut t), None);
        assert_eq!(s.last_served(Direction::Ul), Some(b));

        // Cursor still at b, so c comes before a
        t.context_mut(a).unwrap().scheduling_request(SubframeTime::default());
        t.context_mut(c).unwrap().scheduling_request(SubframeTime::default());
        assert_eq!(ul_served(&mut s, &mut t), Some(c));
        assert_eq!(ul_served(&mut s, &mut t), Some(a));
    }

    #[test]
    fn test_never_selects_disconnected() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        fill_dl(&mut t, a, 3);
        t.context_mut(a).unwrap().connected = false;
        let mut s = RoundRobinScheduler::new();
        assert!(s.schedule_downlink(&mut t, SubframeTime::default(), 1).is_empty());
        assert_eq!(s.last_served(Direction::Dl), None);
    }

    #[test]
    fn test_zero_units_yields_nothing() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        fill_dl(&mut t, a, 3);
        let mut s = RoundRobinScheduler::new();
        assert!(s.schedule_downlink(&mut t, SubframeTime::default(), 0).is_empty());
        assert_eq!(t.get(a).unwrap().dl_queue.len(), 3);
    }

    #[test]
    fn test_assignment_drains_whole_sdus_up_to_tbs() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce1);
        fill_dl(&mut t, a, 10);
        let mut s = RoundRobinScheduler::new();

        // CQI 7: MCS 7, 208 bits = 26 bytes, 6 bytes per SDU with subheader
        let asg = s.schedule_downlink(&mut t, SubframeTime::default(), 1);
        assert_eq!(asg.len(), 1);
        let asg = &asg[0];
        assert_eq!(asg.mcs, 7);
        assert_eq!(asg.tbs_bits, 208);
        assert_eq!(asg.repetitions, 3);
        assert_eq!(asg.sdus.len(), 4);
        assert!(asg.new_data);
        assert_eq!(asg.harq_process, 0);
        assert_eq!(t.get(a).unwrap().dl_queue.len(), 6);
    }

    #[test]
    fn test_ue_with_busy_harq_is_passed_over() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        let b = add(&mut t, 2, CoverageClass::Ce0);
        fill_dl(&mut t, a, 5);
        fill_dl(&mut t, b, 5);
        {
            let entry = t.get_mut(a).unwrap();
            entry.dl_harq.start_transmission(0, HarqBlock::default());
            entry.dl_harq.start_transmission(1, HarqBlock::default());
        }
        let mut s = RoundRobinScheduler::new();
        let asg = s.schedule_downlink(&mut t, SubframeTime::default(), 1);
        assert_eq!(asg[0].rnti, b);
        // a's queue was not touched
        assert_eq!(t.get(a).unwrap().dl_queue.len(), 5);
        assert_eq!(t.take_harq_blocked(), 1);

        ack_all(&mut t);
        let asg = s.schedule_downlink(&mut t, SubframeTime::default(), 1);
        assert_eq!(asg[0].rnti, a);
    }

    #[test]
    fn test_oversized_head_skipped_until_cqi_recovers() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        let b = add(&mut t, 2, CoverageClass::Ce0);
        let c = add(&mut t, 3, CoverageClass::Ce0);
        t.context_mut(b).unwrap().cqi = 0;
        for r in [a, b, c] {
            fill_dl(&mut t, r, 20);
        }
        let mut s = RoundRobinScheduler::new();

        let mut served = Vec::new();
        for _ in 0..4 {
            let asg = s.schedule_downlink(&mut t, SubframeTime::default(), 1);
            assert_eq!(asg.len(), 1);
            served.push(asg[0].rnti);
            ack_all(&mut t);
        }
        // b's 2 byte block never fits a 6 byte SDU, its turns go to the others
        assert_eq!(served, vec![a, c, a, c]);
        assert_eq!(t.get(b).unwrap().dl_queue.len(), 20);
        assert_eq!(t.take_dl_head_blocked(), 2);

        t.context_mut(b).unwrap().cqi = 7;
        assert_eq!(s.schedule_downlink(&mut t, SubframeTime::default(), 1)[0].rnti, a);
        assert_eq!(s.schedule_downlink(&mut t, SubframeTime::default(), 1)[0].rnti, b);
    }

    #[test]
    fn test_grant_consumes_backlog() {
        let mut t = table();
        let a = add(&mut t, 1, CoverageClass::Ce0);
        t.context_mut(a).unwrap().report_buffer_status(15, SubframeTime::default());
        let mut s = RoundRobinScheduler::new();
        let g = s.schedule_uplink(&mut t, SubframeTime::default(), 1);
        // CQI 7: MCS 3, 88 bits = 11 bytes
        assert_eq!(g[0].tbs_bits, 88);
        assert_eq!(g[0].subcarriers, 12);
        assert!(g[0].had_pending_data);
        assert_eq!(t.context(a).unwrap().ul_backlog, 4);
        s.schedule_uplink(&mut t, SubframeTime::default(), 1);
        assert_eq!(t.context(a).unwrap().ul_backlog, 0);
        assert!(s.schedule_uplink(&mut t, SubframeTime::default(), 1).is_empty());
    }
}
