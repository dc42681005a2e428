use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use nbiot_core::{CoverageClass, Direction, HarqProcessId, Rnti, SubframeTime};

use crate::TimerHandle;

use super::harq::HarqManager;
use super::tx_queue::{QueuedSdu, TxQueue};
use super::ue_context::UeContext;

/// Everything the MAC holds for one UE
#[derive(Debug)]
pub struct UeEntry {
    pub ctx: UeContext,
    pub dl_queue: TxQueue,
    pub dl_harq: HarqManager,
    pub ul_harq: HarqManager,
    /// Armed retransmission timers, cancelled when the UE goes away
    pub retx_timers: Vec<(Direction, HarqProcessId, TimerHandle)>,
}

impl UeEntry {
    pub fn harq(&self, dir: Direction) -> &HarqManager {
        match dir {
            Direction::Dl => &self.dl_harq,
            Direction::Ul => &self.ul_harq,
        }
    }

    pub fn harq_mut(&mut self, dir: Direction) -> &mut HarqManager {
        match dir {
            Direction::Dl => &mut self.dl_harq,
            Direction::Ul => &mut self.ul_harq,
        }
    }

    /// Forgets the timer for (dir, pid) and returns its handle, if one was armed
    pub fn take_retx_timer(&mut self, dir: Direction, pid: HarqProcessId) -> Option<TimerHandle> {
        let idx = self.retx_timers.iter().position(|(d, p, _)| *d == dir && *p == pid)?;
        Some(self.retx_timers.swap_remove(idx).2)
    }
}

/// All UEs known to the MAC, ordered by RNTI.
///
/// Schedulers get a mutable borrow of this table for the duration of one scheduling
/// call. They read contexts, test eligibility and drain queues through it but never
/// keep references across calls.
#[derive(Debug)]
pub struct UeTable {
    ues: BTreeMap<Rnti, UeEntry>,
    /// Pool template cloned for each new UE, validated at construction
    harq_template: HarqManager,
    /// Times a UE with pending data was passed over because all its HARQ processes were busy
    harq_blocked: u64,
    /// Times a UE was passed over because its head SDU does not fit the block its CQI allows
    dl_head_blocked: u64,
}

impl UeTable {
    pub fn new(harq_template: HarqManager) -> Self {
        Self {
            ues: BTreeMap::new(),
            harq_template,
            harq_blocked: 0,
            dl_head_blocked: 0,
        }
    }

    /// Adds a connected UE. Returns false if the RNTI is already in use.
    pub fn insert(&mut self, rnti: Rnti, coverage_class: CoverageClass, now: SubframeTime) -> bool {
        if self.ues.contains_key(&rnti) {
            return false;
        }
        self.ues.insert(rnti, UeEntry {
            ctx: UeContext::new(rnti, coverage_class, now),
            dl_queue: TxQueue::new(),
            dl_harq: self.harq_template.clone(),
            ul_harq: self.harq_template.clone(),
            retx_timers: Vec::new(),
        });
        true
    }

    pub fn remove(&mut self, rnti: Rnti) -> Option<UeEntry> {
        self.ues.remove(&rnti)
    }

    pub fn get(&self, rnti: Rnti) -> Option<&UeEntry> {
        self.ues.get(&rnti)
    }

    pub fn get_mut(&mut self, rnti: Rnti) -> Option<&mut UeEntry> {
        self.ues.get_mut(&rnti)
    }

    pub fn contains(&self, rnti: Rnti) -> bool {
        self.ues.contains_key(&rnti)
    }

    pub fn len(&self) -> usize {
        self.ues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ues.is_empty()
    }

    pub fn context(&self, rnti: Rnti) -> Option<&UeContext> {
        self.ues.get(&rnti).map(|e| &e.ctx)
    }

    pub fn context_mut(&mut self, rnti: Rnti) -> Option<&mut UeContext> {
        self.ues.get_mut(&rnti).map(|e| &mut e.ctx)
    }

    /// All RNTIs in ascending order
    pub fn rntis(&self) -> Vec<Rnti> {
        self.ues.keys().copied().collect()
    }

    /// All RNTIs in ascending order, starting just after `last` and wrapping around
    pub fn round_robin_order(&self, last: Option<Rnti>) -> Vec<Rnti> {
        let Some(last) = last else {
            return self.rntis();
        };
        self.ues.range((Excluded(last), Unbounded))
            .chain(self.ues.range(..=last))
            .map(|(rnti, _)| *rnti)
            .collect()
    }

    /// Connected with downlink data queued
    pub fn dl_pending(&self, rnti: Rnti) -> bool {
        self.get(rnti).is_some_and(|e| e.ctx.connected && !e.dl_queue.is_empty())
    }

    /// Connected with a scheduling request or uplink backlog
    pub fn ul_pending(&self, rnti: Rnti) -> bool {
        self.get(rnti).is_some_and(|e| e.ctx.has_ul_demand())
    }

    /// Pending in `dir` and a HARQ process is free to carry new data
    pub fn is_eligible(&mut self, rnti: Rnti, dir: Direction) -> bool {
        let pending = match dir {
            Direction::Dl => self.dl_pending(rnti),
            Direction::Ul => self.ul_pending(rnti),
        };
        if !pending {
            return false;
        }
        if self.free_process(rnti, dir).is_none() {
            tracing::trace!("is_eligible: {} has {} data but no free HARQ process", rnti, dir);
            self.harq_blocked += 1;
            return false;
        }
        true
    }

    /// Downlink eligible, and the head SDU fits a block of `block_bytes`.
    /// A UE failing only the size check keeps its queue and waits for a better CQI.
    pub fn is_dl_schedulable(&mut self, rnti: Rnti, block_bytes: usize) -> bool {
        if !self.is_eligible(rnti, Direction::Dl) {
            return false;
        }
        let head_cost = self.get(rnti).and_then(|e| e.dl_queue.head_cost()).unwrap_or(0);
        if head_cost > block_bytes {
            tracing::trace!("is_dl_schedulable: head SDU of {} needs {} bytes, block has {}", rnti, head_cost, block_bytes);
            self.dl_head_blocked += 1;
            return false;
        }
        true
    }

    pub fn free_process(&self, rnti: Rnti, dir: Direction) -> Option<HarqProcessId> {
        self.get(rnti)?.harq(dir).get_available_process()
    }

    /// Takes whole SDUs from the UE's queue while they fit in `budget_bytes`
    pub fn drain_dl_queue(&mut self, rnti: Rnti, budget_bytes: usize) -> Vec<QueuedSdu> {
        match self.get_mut(rnti) {
            Some(entry) => entry.dl_queue.drain(budget_bytes),
            None => Vec::new(),
        }
    }

    /// Accounts for an uplink grant. Returns whether the UE had data waiting.
    pub fn consume_ul_grant(&mut self, rnti: Rnti, bytes: u32) -> bool {
        self.context_mut(rnti).is_some_and(|ctx| ctx.consume_ul_grant(bytes))
    }

    /// Returns and clears the blocked counter
    pub fn take_harq_blocked(&mut self) -> u64 {
        std::mem::take(&mut self.harq_blocked)
    }

    pub fn take_dl_head_blocked(&mut self) -> u64 {
        std::mem::take(&mut self.dl_head_blocked)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rnti, &UeEntry)> {
        self.ues.iter()
    }
}
