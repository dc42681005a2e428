use std::collections::VecDeque;

use nbiot_config::{ConfigError, SchedulerPolicy, SharedConfig};
use nbiot_core::nbiot_entities::NbIotEntity;
use nbiot_core::phy_tables::npdsch_repetitions;
use nbiot_core::{CoverageClass, Direction, HarqProcessId, Lcid, Rnti, RntiAllocator, Sap, SubframeTime, assert_warn};
use nbiot_saps::cmac::{CmacSpsConf, CmacSpsReq, CmacUeConnectedInd, SpsAction};
use nbiot_saps::control::MacTimer;
use nbiot_saps::mac::MacSduInd;
use nbiot_saps::phy::{PhyDlTxReq, PhyPrachInd, PhyRarReq, PhyUlDataInd, PhyUlGrantReq};
use nbiot_saps::{SapMsg, SapMsgInner};

use crate::mac::observer::{HarqOutcome, HarqOutcomeEvent, MacObserver, MacStats, ScheduleDecision};
use crate::mac::subcomp::harq::{HarqBlock, HarqManager};
use crate::mac::subcomp::mac_pdu::{MacPdu, MacPduElement};
use crate::mac::subcomp::sched::link_adapt::max_dl_sdu_len;
use crate::mac::subcomp::sched::{DlAssignment, Scheduler, SpsConfig, SpsScheduler, SpsStats, UlGrant, build_scheduler};
use crate::mac::subcomp::tx_queue::QueuedSdu;
use crate::mac::subcomp::ue_context::UeContext;
use crate::mac::subcomp::ue_table::UeTable;
use crate::mac::MacError;
use crate::{MessageQueue, NbIotEntityTrait};

/// A single narrowband carrier offers one resource unit per direction per subframe
const UNITS_PER_SUBFRAME: usize = 1;

/// NB-IoT eNB MAC.
///
/// Owns every UE's context, downlink queue and HARQ pools. Each subframe it serves pending
/// retransmissions first and otherwise asks the installed scheduler for new assignments,
/// stores the resulting blocks in HARQ and hands them to the PHY.
pub struct MacEnb {
    self_component: NbIotEntity,
    config: SharedConfig,
    /// Subframe that control calls made now apply to
    now: SubframeTime,

    ues: UeTable,
    scheduler: Option<Box<dyn Scheduler>>,
    rnti_alloc: RntiAllocator,

    /// Processes whose retransmission window passed, served ahead of new data
    dl_retx: VecDeque<(Rnti, HarqProcessId)>,
    ul_retx: VecDeque<(Rnti, HarqProcessId)>,

    observers: Vec<Box<dyn MacObserver>>,
    stats: MacStats,
}

impl MacEnb {
    pub fn new(config: SharedConfig) -> Result<Self, ConfigError> {
        let c = config.config();
        let harq_template = HarqManager::new(c.harq.num_processes, c.harq.max_transmissions)?;
        let scheduler = build_scheduler(&c);
        tracing::info!("MacEnb: cell {} scheduler {} harq {}x{}",
            c.cell.cell_id, c.mac.scheduler, c.harq.num_processes, c.harq.max_transmissions);

        Ok(Self {
            self_component: NbIotEntity::Mac,
            config,
            now: SubframeTime::default(),
            ues: UeTable::new(harq_template),
            scheduler: Some(scheduler),
            rnti_alloc: RntiAllocator::new(),
            dl_retx: VecDeque::new(),
            ul_retx: VecDeque::new(),
            observers: Vec::new(),
            stats: MacStats::default(),
        })
    }

    /// Sets the subframe used by control calls made before the next tick
    pub fn set_time(&mut self, ts: SubframeTime) {
        self.now = ts;
    }

    /// Replaces the scheduler. With None, ticks only serve retransmissions.
    pub fn set_scheduler(&mut self, scheduler: Option<Box<dyn Scheduler>>) {
        tracing::info!("set_scheduler: {:?}", scheduler.as_ref().map(|s| s.policy()));
        self.scheduler = scheduler;
        self.sync_state();
    }

    pub fn scheduler_policy(&self) -> Option<SchedulerPolicy> {
        self.scheduler.as_ref().map(|s| s.policy())
    }

    pub fn add_observer(&mut self, observer: Box<dyn MacObserver>) {
        self.observers.push(observer);
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    // ----------------------------------------------------------------------------------------
    // UE lifecycle and state reports

    /// Registers a connected UE. With the SPS policy and auto-activation configured, the UE
    /// gets the default periodic allocation right away.
    pub fn add_ue(&mut self, rnti: Rnti, coverage_class: CoverageClass) -> Result<(), MacError> {
        if self.ues.contains(rnti) {
            return Err(MacError::UeExists(rnti));
        }
        let c = self.config.config();
        if self.ues.len() >= c.cell.max_ues {
            return Err(MacError::CellFull { max: c.cell.max_ues });
        }
        self.ues.insert(rnti, coverage_class, self.now);
        tracing::debug!(ts = %self.now, "add_ue: {} {}", rnti, coverage_class);

        if c.sps.auto_activate {
            if let Some(sps) = self.scheduler.as_mut().and_then(|s| s.as_sps_mut()) {
                sps.activate(&self.ues, rnti, self.now)?;
            }
        }
        self.sync_state();
        Ok(())
    }

    /// Drops every piece of state held for the UE and cancels its retransmission timers
    pub fn remove_ue(&mut self, queue: &mut MessageQueue, rnti: Rnti) -> Result<(), MacError> {
        let mut entry = self.ues.remove(rnti).ok_or(MacError::UnknownUe(rnti))?;
        for (_, _, handle) in entry.retx_timers.drain(..) {
            queue.cancel(handle);
        }
        let in_flight = entry.dl_harq.active_count() + entry.ul_harq.active_count();
        entry.dl_harq.reset_all();
        entry.ul_harq.reset_all();
        self.dl_retx.retain(|(r, _)| *r != rnti);
        self.ul_retx.retain(|(r, _)| *r != rnti);
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.ue_removed(rnti);
        }
        tracing::debug!(ts = %self.now, "remove_ue: {} dropped {} queued SDUs, {} HARQ processes in flight", rnti, entry.dl_queue.len(), in_flight);
        self.sync_state();
        Ok(())
    }

    /// Queues an RLC PDU for the UE. SDUs longer than the largest downlink block are refused.
    pub fn enqueue_dl_sdu(&mut self, rnti: Rnti, lcid: Lcid, sdu: Vec<u8>) -> Result<(), MacError> {
        let max = max_dl_sdu_len();
        if sdu.len() > max {
            return Err(MacError::SduTooLarge { len: sdu.len(), max });
        }
        let entry = self.ues.get_mut(rnti).ok_or(MacError::UnknownUe(rnti))?;
        entry.dl_queue.push(QueuedSdu::new(lcid, sdu));
        Ok(())
    }

    pub fn report_buffer_status(&mut self, rnti: Rnti, bytes: u32) -> Result<(), MacError> {
        let now = self.now;
        let ctx = self.ues.context_mut(rnti).ok_or(MacError::UnknownUe(rnti))?;
        ctx.report_buffer_status(bytes, now);
        Ok(())
    }

    pub fn scheduling_request(&mut self, rnti: Rnti) -> Result<(), MacError> {
        let now = self.now;
        let ctx = self.ues.context_mut(rnti).ok_or(MacError::UnknownUe(rnti))?;
        ctx.scheduling_request(now);
        Ok(())
    }

    pub fn update_channel_quality(&mut self, rnti: Rnti, cqi: u8, coverage_class: Option<CoverageClass>) -> Result<(), MacError> {
        let ctx = self.ues.context_mut(rnti).ok_or(MacError::UnknownUe(rnti))?;
        ctx.cqi = cqi.min(15);
        if let Some(cc) = coverage_class {
            if cc != ctx.coverage_class {
                tracing::debug!("update_channel_quality: {} moved {} -> {}", rnti, ctx.coverage_class, cc);
                ctx.coverage_class = cc;
            }
        }
        Ok(())
    }

    pub fn ue_context(&self, rnti: Rnti) -> Option<&UeContext> {
        self.ues.context(rnti)
    }

    pub fn harq(&self, rnti: Rnti, dir: Direction) -> Option<&HarqManager> {
        self.ues.get(rnti).map(|e| e.harq(dir))
    }

    pub fn dl_queue_len(&self, rnti: Rnti) -> usize {
        self.ues.get(rnti).map_or(0, |e| e.dl_queue.len())
    }

    pub fn num_ues(&self) -> usize {
        self.ues.len()
    }

    // ----------------------------------------------------------------------------------------
    // HARQ feedback

    /// Downlink ACK. Unknown UEs and idle processes are ignored.
    pub fn process_ack(&mut self, queue: &mut MessageQueue, rnti: Rnti, pid: HarqProcessId) {
        self.harq_feedback(queue, Direction::Dl, rnti, pid, true);
    }

    /// Downlink NACK. Returns true if a retransmission was armed, false if the process gave
    /// up or the feedback was stale.
    pub fn process_nack(&mut self, queue: &mut MessageQueue, rnti: Rnti, pid: HarqProcessId) -> bool {
        self.harq_feedback(queue, Direction::Dl, rnti, pid, false)
    }

    fn harq_feedback(&mut self, queue: &mut MessageQueue, dir: Direction, rnti: Rnti, pid: HarqProcessId, ack: bool) -> bool {
        let ts = self.now;
        let retx_delay = self.config.config().harq.retx_delay_subframes;

        let Some(entry) = self.ues.get_mut(rnti) else {
            tracing::debug!(ts = %ts, "harq_feedback: {} {} for unknown {}", dir, if ack { "ACK" } else { "NACK" }, rnti);
            return false;
        };
        if !entry.harq(dir).is_active(pid) {
            tracing::debug!(ts = %ts, "harq_feedback: {} {} for idle process {} of {}", dir, if ack { "ACK" } else { "NACK" }, pid, rnti);
            return false;
        }
        if let Some(handle) = entry.take_retx_timer(dir, pid) {
            queue.cancel(handle);
        }

        let outcome = if ack {
            entry.harq_mut(dir).process_ack(pid);
            HarqOutcome::Ack
        } else if entry.harq_mut(dir).process_nack(pid) {
            let attempt = entry.harq(dir).get(pid).map_or(0, |p| p.attempt);
            let timer = MacTimer::RetxDue { rnti, direction: dir, harq_process: pid };
            let msg = SapMsg::new(Sap::Control, self.self_component, self.self_component, ts, SapMsgInner::MacTimer(timer));
            let handle = queue.push_delayed(msg, retx_delay);
            entry.retx_timers.push((dir, pid, handle));
            HarqOutcome::Retry { attempt }
        } else {
            tracing::info!(ts = %ts, "harq_feedback: {} process {} of {} gave up", dir, pid, rnti);
            HarqOutcome::GaveUp
        };

        self.retx_queue(dir).retain(|&(r, p)| !(r == rnti && p == pid));
        self.emit_harq_outcome(HarqOutcomeEvent { ts, direction: dir, rnti, harq_process: pid, outcome });
        matches!(outcome, HarqOutcome::Retry { .. })
    }

    fn retx_queue(&mut self, dir: Direction) -> &mut VecDeque<(Rnti, HarqProcessId)> {
        match dir {
            Direction::Dl => &mut self.dl_retx,
            Direction::Ul => &mut self.ul_retx,
        }
    }

    /// Cancels any pending retransmission of (rnti, dir, pid)
    fn forget_retx(&mut self, queue: &mut MessageQueue, dir: Direction, rnti: Rnti, pid: HarqProcessId) {
        if let Some(handle) = self.ues.get_mut(rnti).and_then(|e| e.take_retx_timer(dir, pid)) {
            queue.cancel(handle);
        }
        self.retx_queue(dir).retain(|&(r, p)| !(r == rnti && p == pid));
    }

    // ----------------------------------------------------------------------------------------
    // Semi-persistent scheduling

    fn sps(&self) -> Result<&SpsScheduler, MacError> {
        self.scheduler.as_ref().and_then(|s| s.as_sps()).ok_or(MacError::SpsNotEnabled)
    }

    pub fn configure_sps(&mut self, rnti: Rnti, interval_ms: u32, subcarriers: u8) -> Result<(), MacError> {
        let sps = self.scheduler.as_mut().and_then(|s| s.as_sps_mut()).ok_or(MacError::SpsNotEnabled)?;
        sps.configure(&self.ues, rnti, interval_ms, subcarriers, self.now)?;
        self.sync_state();
        Ok(())
    }

    pub fn activate_sps(&mut self, rnti: Rnti) -> Result<(), MacError> {
        let sps = self.scheduler.as_mut().and_then(|s| s.as_sps_mut()).ok_or(MacError::SpsNotEnabled)?;
        sps.activate(&self.ues, rnti, self.now)?;
        self.sync_state();
        Ok(())
    }

    pub fn deactivate_sps(&mut self, rnti: Rnti) -> Result<(), MacError> {
        let sps = self.scheduler.as_mut().and_then(|s| s.as_sps_mut()).ok_or(MacError::SpsNotEnabled)?;
        sps.deactivate(rnti)?;
        self.sync_state();
        Ok(())
    }

    pub fn is_sps_active(&self, rnti: Rnti) -> bool {
        self.sps().is_ok_and(|s| s.is_active(rnti))
    }

    pub fn get_sps_config(&self, rnti: Rnti) -> Option<SpsConfig> {
        self.sps().ok()?.get_config(rnti)
    }

    pub fn get_active_sps_count(&self) -> usize {
        self.sps().map_or(0, |s| s.active_count())
    }

    pub fn sps_stats(&self) -> Option<SpsStats> {
        self.sps().ok().map(|s| s.stats())
    }

    fn sync_state(&self) {
        let mut state = self.config.state_write();
        state.connected_ues = self.ues.len();
        state.active_sps = self.get_active_sps_count();
    }

    // ----------------------------------------------------------------------------------------
    // Observers

    fn emit_decision(&mut self, decision: ScheduleDecision) {
        tracing::debug!(ts = %decision.ts, "{} {} pid {} mcs {} tbs {} reps {}{}{}",
            decision.direction, decision.rnti, decision.harq_process, decision.mcs, decision.tbs_bits,
            decision.repetitions, if decision.new_data { "" } else { " retx" }, if decision.sps { " sps" } else { "" });
        self.stats.on_schedule_decision(&decision);
        for o in self.observers.iter_mut() {
            o.on_schedule_decision(&decision);
        }
    }

    fn emit_harq_outcome(&mut self, event: HarqOutcomeEvent) {
        self.stats.on_harq_outcome(&event);
        for o in self.observers.iter_mut() {
            o.on_harq_outcome(&event);
        }
    }

    // ----------------------------------------------------------------------------------------
    // Per-subframe scheduling

    /// Next queued retransmission whose process is still waiting for it
    fn pop_retx(&mut self, dir: Direction) -> Option<(Rnti, HarqProcessId)> {
        while let Some((rnti, pid)) = self.retx_queue(dir).pop_front() {
            if self.ues.get(rnti).is_some_and(|e| e.harq(dir).is_active(pid)) {
                return Some((rnti, pid));
            }
            tracing::debug!("pop_retx: dropping {} retransmission of {} pid {}", dir, rnti, pid);
        }
        None
    }

    fn schedule_downlink(&mut self, queue: &mut MessageQueue, ts: SubframeTime) {
        if let Some((rnti, pid)) = self.pop_retx(Direction::Dl) {
            self.retransmit(queue, ts, Direction::Dl, rnti, pid);
            return;
        }
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let assignments = scheduler.schedule_downlink(&mut self.ues, ts, UNITS_PER_SUBFRAME);
        assert_warn!(assignments.len() <= UNITS_PER_SUBFRAME, "{} DL assignments for {} units", assignments.len(), UNITS_PER_SUBFRAME);
        for a in assignments.into_iter().take(UNITS_PER_SUBFRAME) {
            self.transmit_dl(queue, ts, a);
        }
    }

    fn schedule_uplink(&mut self, queue: &mut MessageQueue, ts: SubframeTime) {
        if let Some((rnti, pid)) = self.pop_retx(Direction::Ul) {
            self.retransmit(queue, ts, Direction::Ul, rnti, pid);
            return;
        }
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let grants = scheduler.schedule_uplink(&mut self.ues, ts, UNITS_PER_SUBFRAME);
        assert_warn!(grants.len() <= UNITS_PER_SUBFRAME, "{} UL grants for {} units", grants.len(), UNITS_PER_SUBFRAME);
        for g in grants.into_iter().take(UNITS_PER_SUBFRAME) {
            self.transmit_ul(queue, ts, g);
        }
    }

    /// Builds the MAC PDU for a new assignment, stores it in HARQ and sends it to the PHY
    fn transmit_dl(&mut self, queue: &mut MessageQueue, ts: SubframeTime, a: DlAssignment) {
        let Some(entry) = self.ues.get_mut(a.rnti) else {
            tracing::warn!(ts = %ts, "transmit_dl: assignment for unknown {}", a.rnti);
            return;
        };
        if entry.dl_harq.is_active(a.harq_process) {
            tracing::warn!(ts = %ts, "transmit_dl: process {} of {} busy, requeueing {} SDUs", a.harq_process, a.rnti, a.sdus.len());
            entry.dl_queue.requeue_front(a.sdus);
            return;
        }

        let mut pdu = MacPdu::new();
        for sdu in a.sdus {
            pdu.add_sdu(sdu.lcid, sdu.payload);
        }
        pdu.add_padding(a.tbs_bits as usize / 8);
        let payload = pdu.serialize();

        let block = HarqBlock {
            mcs: a.mcs,
            tbs_bits: a.tbs_bits,
            repetitions: a.repetitions,
            subcarriers: 0,
            payload: payload.clone(),
        };
        if entry.dl_harq.start_transmission(a.harq_process, block).is_none() {
            tracing::warn!(ts = %ts, "transmit_dl: no process {} for {}", a.harq_process, a.rnti);
            return;
        }

        let req = PhyDlTxReq {
            rnti: a.rnti,
            harq_process: a.harq_process,
            mcs: a.mcs,
            tbs_bits: a.tbs_bits,
            repetitions: a.repetitions,
            rv: a.rv,
            new_data: true,
            pdu: payload,
        };
        self.send_to_phy(queue, ts, SapMsgInner::PhyDlTxReq(req));
        self.emit_decision(ScheduleDecision {
            ts,
            direction: Direction::Dl,
            rnti: a.rnti,
            harq_process: a.harq_process,
            mcs: a.mcs,
            tbs_bits: a.tbs_bits,
            repetitions: a.repetitions,
            new_data: true,
            sps: false,
        });
    }

    /// Registers a new uplink grant with HARQ and sends it to the PHY. Periodic grants
    /// take over their reserved process even if it is still busy, reporting the dropped
    /// block as superseded.
    fn transmit_ul(&mut self, queue: &mut MessageQueue, ts: SubframeTime, g: UlGrant) {
        let busy = self.ues.get(g.rnti).map(|e| e.ul_harq.is_active(g.harq_process));
        match busy {
            None => {
                tracing::warn!(ts = %ts, "transmit_ul: grant for unknown {}", g.rnti);
                return;
            }
            Some(true) if g.sps => {
                tracing::info!(ts = %ts, "transmit_ul: periodic grant supersedes unacknowledged process {} of {}", g.harq_process, g.rnti);
                self.forget_retx(queue, Direction::Ul, g.rnti, g.harq_process);
                self.emit_harq_outcome(HarqOutcomeEvent {
                    ts,
                    direction: Direction::Ul,
                    rnti: g.rnti,
                    harq_process: g.harq_process,
                    outcome: HarqOutcome::Superseded,
                });
            }
            Some(true) => {
                tracing::warn!(ts = %ts, "transmit_ul: process {} of {} busy, dropping grant", g.harq_process, g.rnti);
                return;
            }
            Some(false) => {}
        }

        let block = HarqBlock {
            mcs: g.mcs,
            tbs_bits: g.tbs_bits,
            repetitions: g.repetitions,
            subcarriers: g.subcarriers,
            payload: Vec::new(),
        };
        let started = self.ues.get_mut(g.rnti)
            .and_then(|e| e.ul_harq.start_transmission(g.harq_process, block))
            .is_some();
        if !started {
            tracing::warn!(ts = %ts, "transmit_ul: no process {} for {}", g.harq_process, g.rnti);
            return;
        }

        let req = PhyUlGrantReq {
            rnti: g.rnti,
            harq_process: g.harq_process,
            mcs: g.mcs,
            tbs_bits: g.tbs_bits,
            subcarriers: g.subcarriers,
            repetitions: g.repetitions,
            rv: g.rv,
            new_data: true,
            sps: g.sps,
        };
        self.send_to_phy(queue, ts, SapMsgInner::PhyUlGrantReq(req));
        self.emit_decision(ScheduleDecision {
            ts,
            direction: Direction::Ul,
            rnti: g.rnti,
            harq_process: g.harq_process,
            mcs: g.mcs,
            tbs_bits: g.tbs_bits,
            repetitions: g.repetitions,
            new_data: true,
            sps: g.sps,
        });
    }

    /// Resends the buffered block of an active process with the next redundancy version
    fn retransmit(&mut self, queue: &mut MessageQueue, ts: SubframeTime, dir: Direction, rnti: Rnti, pid: HarqProcessId) {
        let Some(p) = self.ues.get(rnti).and_then(|e| e.harq(dir).get(pid)) else {
            return;
        };
        let block = &p.block;
        let msg = match dir {
            Direction::Dl => SapMsgInner::PhyDlTxReq(PhyDlTxReq {
                rnti,
                harq_process: pid,
                mcs: block.mcs,
                tbs_bits: block.tbs_bits,
                repetitions: block.repetitions,
                rv: p.rv(),
                new_data: false,
                pdu: block.payload.clone(),
            }),
            Direction::Ul => SapMsgInner::PhyUlGrantReq(PhyUlGrantReq {
                rnti,
                harq_process: pid,
                mcs: block.mcs,
                tbs_bits: block.tbs_bits,
                subcarriers: block.subcarriers,
                repetitions: block.repetitions,
                rv: p.rv(),
                new_data: false,
                sps: false,
            }),
        };
        let decision = ScheduleDecision {
            ts,
            direction: dir,
            rnti,
            harq_process: pid,
            mcs: block.mcs,
            tbs_bits: block.tbs_bits,
            repetitions: block.repetitions,
            new_data: false,
            sps: false,
        };
        self.send_to_phy(queue, ts, msg);
        self.emit_decision(decision);
    }

    fn send_to_phy(&self, queue: &mut MessageQueue, ts: SubframeTime, msg: SapMsgInner) {
        queue.push_back(SapMsg::new(Sap::PhySap, self.self_component, NbIotEntity::Phy, ts, msg));
    }

    // ----------------------------------------------------------------------------------------
    // Primitive handlers

    fn rx_phy_prim(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        tracing::trace!("rx_phy_prim");
        let result = match message.msg {
            SapMsgInner::PhyPrachInd(prim) => {
                self.rx_prach_ind(queue, prim);
                Ok(())
            }
            SapMsgInner::PhyHarqFeedbackInd(prim) => {
                self.harq_feedback(queue, Direction::Dl, prim.rnti, prim.harq_process, prim.ack);
                Ok(())
            }
            SapMsgInner::PhyUlDataInd(prim) => {
                self.rx_ul_data_ind(queue, prim);
                Ok(())
            }
            SapMsgInner::PhySrInd(prim) => self.scheduling_request(prim.rnti),
            SapMsgInner::PhyBsrInd(prim) => self.report_buffer_status(prim.rnti, prim.buffer_size),
            SapMsgInner::PhyCqiInd(prim) => self.update_channel_quality(prim.rnti, prim.cqi, prim.coverage_class),
            other => {
                tracing::warn!("rx_phy_prim: unexpected {}", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::debug!(ts = %self.now, "rx_phy_prim: {}", e);
        }
    }

    fn rx_prach_ind(&mut self, queue: &mut MessageQueue, prim: PhyPrachInd) {
        tracing::debug!(ts = %self.now, "rx_prach_ind: preamble {} ta {} {}", prim.preamble_id, prim.timing_advance, prim.coverage_class);
        let timer = MacTimer::RarDue {
            preamble_id: prim.preamble_id,
            timing_advance: prim.timing_advance,
            coverage_class: prim.coverage_class,
        };
        let delay = self.config.config().mac.rar_delay_subframes;
        let msg = SapMsg::new(Sap::Control, self.self_component, self.self_component, self.now, SapMsgInner::MacTimer(timer));
        queue.push_delayed(msg, delay);
    }

    /// Admits the UE behind a preamble: allocates a C-RNTI, answers with a RAR and tells RRC
    fn send_rar(&mut self, queue: &mut MessageQueue, preamble_id: u8, timing_advance: u16, coverage_class: CoverageClass) -> Result<Rnti, MacError> {
        let ts = self.now;
        let max_ues = self.config.config().cell.max_ues;
        if self.ues.len() >= max_ues {
            return Err(MacError::CellFull { max: max_ues });
        }
        let ues = &self.ues;
        let rnti = self.rnti_alloc.allocate(|r| ues.contains(r)).ok_or(MacError::NoRntiAvailable)?;
        self.add_ue(rnti, coverage_class)?;

        let rar = PhyRarReq {
            preamble_id,
            timing_advance,
            temp_crnti: rnti,
            repetitions: npdsch_repetitions(coverage_class.index() * 2),
        };
        self.send_to_phy(queue, ts, SapMsgInner::PhyRarReq(rar));
        queue.push_back(SapMsg::new(
            Sap::CmacSap,
            self.self_component,
            NbIotEntity::Rrc,
            ts,
            SapMsgInner::CmacUeConnectedInd(CmacUeConnectedInd { rnti, coverage_class }),
        ));

        tracing::info!(ts = %ts, "send_rar: preamble {} -> {} ({})", preamble_id, rnti, coverage_class);
        self.stats.on_random_access(rnti, preamble_id);
        for o in self.observers.iter_mut() {
            o.on_random_access(rnti, preamble_id);
        }
        Ok(rnti)
    }

    fn rx_ul_data_ind(&mut self, queue: &mut MessageQueue, prim: PhyUlDataInd) {
        let ts = self.now;
        let Some(ctx) = self.ues.context_mut(prim.rnti) else {
            tracing::debug!(ts = %ts, "rx_ul_data_ind: data from unknown {}", prim.rnti);
            return;
        };
        ctx.last_activity = ts;

        if !prim.crc_ok {
            self.harq_feedback(queue, Direction::Ul, prim.rnti, prim.harq_process, false);
            return;
        }
        self.harq_feedback(queue, Direction::Ul, prim.rnti, prim.harq_process, true);

        let pdu = match MacPdu::parse(&prim.pdu) {
            Ok(pdu) => pdu,
            Err(e) => {
                tracing::warn!(ts = %ts, "rx_ul_data_ind: malformed PDU from {}: {}", prim.rnti, e);
                return;
            }
        };
        for element in pdu.elements() {
            match element {
                MacPduElement::Sdu { lcid, payload } => {
                    let ind = MacSduInd { rnti: prim.rnti, lcid: *lcid, sdu: payload.clone() };
                    queue.push_back(SapMsg::new(Sap::MacSap, self.self_component, NbIotEntity::Rlc, ts, SapMsgInner::MacSduInd(ind)));
                }
                MacPduElement::ShortBsr { .. } | MacPduElement::LongBsr { .. } => {
                    if let (Some(bytes), Some(ctx)) = (element.reported_buffer_bytes(), self.ues.context_mut(prim.rnti)) {
                        tracing::trace!("rx_ul_data_ind: {} reports {} bytes", prim.rnti, bytes);
                        ctx.report_buffer_status(bytes, ts);
                    }
                }
                MacPduElement::Phr { ph } => {
                    tracing::trace!("rx_ul_data_ind: {} power headroom {}", prim.rnti, ph);
                }
                MacPduElement::Padding(_) => {}
            }
        }
    }

    fn rx_mac_prim(&mut self, _queue: &mut MessageQueue, message: SapMsg) {
        tracing::trace!("rx_mac_prim");
        match message.msg {
            SapMsgInner::MacSduReq(prim) => {
                if let Err(e) = self.enqueue_dl_sdu(prim.rnti, prim.lcid, prim.sdu) {
                    tracing::warn!(ts = %self.now, "rx_mac_prim: dropping SDU for {}: {}", prim.rnti, e);
                }
            }
            other => tracing::warn!("rx_mac_prim: unexpected {}", other),
        }
    }

    fn rx_cmac_prim(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        tracing::trace!("rx_cmac_prim");
        match message.msg {
            SapMsgInner::CmacUeReleaseReq(prim) => {
                if let Err(e) = self.remove_ue(queue, prim.rnti) {
                    tracing::debug!(ts = %self.now, "rx_cmac_prim: release: {}", e);
                }
            }
            SapMsgInner::CmacSpsReq(prim) => self.rx_cmac_sps_req(queue, prim),
            other => tracing::warn!("rx_cmac_prim: unexpected {}", other),
        }
    }

    fn rx_cmac_sps_req(&mut self, queue: &mut MessageQueue, prim: CmacSpsReq) {
        let result = match prim.action {
            SpsAction::Configure { interval_ms, subcarriers } => self.configure_sps(prim.rnti, interval_ms, subcarriers),
            SpsAction::Activate => self.activate_sps(prim.rnti),
            SpsAction::Deactivate => self.deactivate_sps(prim.rnti),
        };
        if let Err(e) = &result {
            tracing::warn!(ts = %self.now, "rx_cmac_sps_req: {:?} for {} rejected: {}", prim.action, prim.rnti, e);
        }
        let conf = CmacSpsConf {
            rnti: prim.rnti,
            action: prim.action,
            accepted: result.is_ok(),
            active: self.is_sps_active(prim.rnti),
        };
        queue.push_back(SapMsg::new(Sap::CmacSap, self.self_component, NbIotEntity::Rrc, self.now, SapMsgInner::CmacSpsConf(conf)));
    }

    fn rx_control(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        tracing::trace!("rx_control");
        let timer = match message.msg {
            SapMsgInner::MacTimer(timer) => timer,
            other => {
                tracing::warn!("rx_control: unexpected {}", other);
                return;
            }
        };
        match timer {
            MacTimer::RarDue { preamble_id, timing_advance, coverage_class } => {
                if let Err(e) = self.send_rar(queue, preamble_id, timing_advance, coverage_class) {
                    tracing::warn!(ts = %self.now, "rx_control: no RAR for preamble {}: {}", preamble_id, e);
                }
            }
            MacTimer::RetxDue { rnti, direction, harq_process } => {
                let armed = self.ues.get_mut(rnti).and_then(|e| e.take_retx_timer(direction, harq_process)).is_some();
                let active = self.ues.get(rnti).is_some_and(|e| e.harq(direction).is_active(harq_process));
                if armed && active {
                    self.retx_queue(direction).push_back((rnti, harq_process));
                } else {
                    tracing::debug!(ts = %self.now, "rx_control: stale {} retransmission timer for {} pid {}", direction, rnti, harq_process);
                }
            }
        }
    }
}

impl NbIotEntityTrait for MacEnb {
    fn entity(&self) -> NbIotEntity {
        self.self_component
    }

    fn set_config(&mut self, config: SharedConfig) {
        self.config = config;
    }

    fn rx_prim(&mut self, queue: &mut MessageQueue, message: SapMsg) {
        match message.sap {
            Sap::PhySap => self.rx_phy_prim(queue, message),
            Sap::MacSap => self.rx_mac_prim(queue, message),
            Sap::CmacSap => self.rx_cmac_prim(queue, message),
            Sap::Control => self.rx_control(queue, message),
        }
    }

    fn tick_start(&mut self, queue: &mut MessageQueue, ts: SubframeTime) {
        self.now = ts;
        self.schedule_downlink(queue, ts);
        self.schedule_uplink(queue, ts);
        self.stats.harq_blocked += self.ues.take_harq_blocked();
        self.stats.dl_head_blocked += self.ues.take_dl_head_blocked();
    }

    fn tick_end(&mut self, _queue: &mut MessageQueue, ts: SubframeTime) -> bool {
        self.now = ts.add_subframes(1);
        false
    }
}

#[cfg(test)]
mod tests {
    use nbiot_config::StackConfig;

    use super::*;

    fn mac(policy: SchedulerPolicy) -> MacEnb {
        let cfg = SharedConfig::new(policy).unwrap();
        MacEnb::new(cfg).unwrap()
    }

    fn drain(queue: &mut MessageQueue) -> Vec<SapMsg> {
        std::iter::from_fn(|| queue.pop_front()).collect()
    }

    #[test]
    fn test_add_remove_ue() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        let mut q = MessageQueue::new();
        m.add_ue(Rnti(5), CoverageClass::Ce1).unwrap();
        assert_eq!(m.add_ue(Rnti(5), CoverageClass::Ce0), Err(MacError::UeExists(Rnti(5))));
        assert_eq!(m.ue_context(Rnti(5)).unwrap().cqi, 7);
        assert_eq!(m.config.state_read().connected_ues, 1);

        m.remove_ue(&mut q, Rnti(5)).unwrap();
        assert_eq!(m.remove_ue(&mut q, Rnti(5)), Err(MacError::UnknownUe(Rnti(5))));
        assert_eq!(m.num_ues(), 0);
        assert_eq!(m.config.state_read().connected_ues, 0);
    }

    #[test]
    fn test_cell_full() {
        let mut cfg = StackConfig::default();
        cfg.cell.max_ues = 1;
        let mut m = MacEnb::new(SharedConfig::from_config(cfg).unwrap()).unwrap();
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        assert_eq!(m.add_ue(Rnti(2), CoverageClass::Ce0), Err(MacError::CellFull { max: 1 }));
    }

    #[test]
    fn test_rar_rejections() {
        let mut cfg = StackConfig::default();
        cfg.cell.max_ues = 3;
        let mut m = MacEnb::new(SharedConfig::from_config(cfg).unwrap()).unwrap();
        let mut q = MessageQueue::new();
        m.rnti_alloc = RntiAllocator::with_range(1, 3);

        assert_eq!(m.send_rar(&mut q, 4, 0, CoverageClass::Ce0), Ok(Rnti(1)));
        assert_eq!(m.send_rar(&mut q, 5, 0, CoverageClass::Ce0), Ok(Rnti(2)));
        assert_eq!(m.send_rar(&mut q, 6, 0, CoverageClass::Ce0), Err(MacError::NoRntiAvailable));
        m.add_ue(Rnti(7), CoverageClass::Ce0).unwrap();
        assert_eq!(m.send_rar(&mut q, 6, 0, CoverageClass::Ce0), Err(MacError::CellFull { max: 3 }));
        assert_eq!(m.stats().rar_sent, 2);
        assert_eq!(drain(&mut q).len(), 4);
    }

    #[test]
    fn test_sdu_limits() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        assert_eq!(m.enqueue_dl_sdu(Rnti(1), 2, vec![0; 4]), Err(MacError::UnknownUe(Rnti(1))));
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        assert_eq!(m.enqueue_dl_sdu(Rnti(1), 2, vec![0; 50]), Err(MacError::SduTooLarge { len: 50, max: 49 }));
        m.enqueue_dl_sdu(Rnti(1), 2, vec![0; 49]).unwrap();
        assert_eq!(m.dl_queue_len(Rnti(1)), 1);
    }

    #[test]
    fn test_sps_requires_sps_policy() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        assert_eq!(m.activate_sps(Rnti(1)), Err(MacError::SpsNotEnabled));
        assert!(!m.is_sps_active(Rnti(1)));
        assert_eq!(m.get_active_sps_count(), 0);
        assert!(m.sps_stats().is_none());
    }

    #[test]
    fn test_auto_activate() {
        let mut cfg = StackConfig::new(SchedulerPolicy::Sps);
        cfg.sps.auto_activate = true;
        cfg.sps.default_interval_ms = 40;
        let mut m = MacEnb::new(SharedConfig::from_config(cfg).unwrap()).unwrap();
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        assert!(m.is_sps_active(Rnti(1)));
        assert_eq!(m.get_sps_config(Rnti(1)).unwrap().interval_ms, 40);
        assert_eq!(m.config.state_read().active_sps, 1);
    }

    #[test]
    fn test_downlink_block_stored_and_sent() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        let mut q = MessageQueue::new();
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        m.enqueue_dl_sdu(Rnti(1), 2, vec![0xAA; 10]).unwrap();
        m.tick_start(&mut q, SubframeTime::default());

        let msgs = drain(&mut q);
        assert_eq!(msgs.len(), 1);
        let SapMsgInner::PhyDlTxReq(req) = &msgs[0].msg else {
            panic!("expected PhyDlTxReq, got {}", msgs[0].msg);
        };
        assert_eq!((req.mcs, req.tbs_bits, req.harq_process, req.rv), (7, 208, 0, 0));
        assert_eq!(req.pdu.len(), 26);
        let parsed = MacPdu::parse(&req.pdu).unwrap();
        assert_eq!(parsed.sdus().next(), Some((2, &[0xAA; 10][..])));

        let harq = m.harq(Rnti(1), Direction::Dl).unwrap();
        assert!(harq.is_active(0));
        assert_eq!(harq.get(0).unwrap().block.payload, req.pdu);
        assert_eq!(m.stats().dl_new_tx, 1);
    }

    #[test]
    fn test_stale_feedback_ignored() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        let mut q = MessageQueue::new();
        assert!(!m.process_nack(&mut q, Rnti(9), 0));
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        assert!(!m.process_nack(&mut q, Rnti(1), 1));
        m.process_ack(&mut q, Rnti(1), 7);
        assert_eq!(q.delayed_len(), 0);
        assert_eq!(*m.stats(), MacStats::default());
    }

    #[test]
    fn test_no_scheduler_is_silent() {
        let mut m = mac(SchedulerPolicy::RoundRobin);
        let mut q = MessageQueue::new();
        m.add_ue(Rnti(1), CoverageClass::Ce0).unwrap();
        m.enqueue_dl_sdu(Rnti(1), 2, vec![1, 2, 3]).unwrap();
        m.set_scheduler(None);
        assert_eq!(m.scheduler_policy(), None);
        m.tick_start(&mut q, SubframeTime::default());
        assert!(q.is_empty());
        assert_eq!(m.dl_queue_len(Rnti(1)), 1);
    }
}
