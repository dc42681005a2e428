//! Semi-persistent uplink scheduling.
//!
//! A UE with an active configuration gets an uplink grant every `interval_ms` without
//! sending a scheduling request first. Grants fire whether or not the UE has data; the
//! empty ones are counted as padding transmissions. Units left after the periodic
//! grants go to a round-robin pass over UEs without an active configuration.
//! Downlink is plain round robin.

use std::collections::BTreeMap;

use nbiot_config::SchedulerPolicy;
use nbiot_core::phy_tables::is_valid_subcarrier_count;
use nbiot_core::{Direction, HarqProcessId, Rnti, SubframeTime};

use super::link_adapt::{sps_params, ul_params};
use super::round_robin::RoundRobinScheduler;
use super::{DlAssignment, Scheduler, UlGrant, build_ul_grant};
use crate::mac::MacError;
use crate::mac::subcomp::ue_table::UeTable;

/// HARQ process set aside for semi-persistent grants
pub const SPS_HARQ_PROCESS: HarqProcessId = 0;

const FALLBACK_UL_REP_STEP: usize = 1;

/// Periodic allocation of one UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpsConfig {
    pub interval_ms: u32,
    pub subcarriers: u8,
    pub mcs: u8,
    pub tbs_bits: u16,
    pub repetitions: u16,
    /// Next subframe a grant is due. Advances by one interval per grant.
    pub next_allocation: SubframeTime,
    pub active: bool,
    pub harq_process: HarqProcessId,
    pub activated_at: Option<SubframeTime>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpsStats {
    /// Periodic grants issued while the UE reported no buffered data
    pub padding_transmissions: u64,
    /// Periodic grants issued while the UE had reported backlog
    pub data_transmissions: u64,
}

#[derive(Debug)]
pub struct SpsScheduler {
    configs: BTreeMap<Rnti, SpsConfig>,
    default_interval_ms: u32,
    default_subcarriers: u8,
    dl: RoundRobinScheduler,
    last_dynamic_ul: Option<Rnti>,
    stats: SpsStats,
}

impl SpsScheduler {
    pub fn new(default_interval_ms: u32, default_subcarriers: u8) -> Self {
        Self {
            configs: BTreeMap::new(),
            default_interval_ms,
            default_subcarriers,
            dl: RoundRobinScheduler::new(),
            last_dynamic_ul: None,
            stats: SpsStats::default(),
        }
    }

    /// Creates or replaces the configuration for `rnti`. The new configuration starts
    /// deactivated. Link parameters come from the UE's current CQI and coverage class.
    pub fn configure(&mut self, ues: &UeTable, rnti: Rnti, interval_ms: u32, subcarriers: u8, now: SubframeTime) -> Result<(), MacError> {
        let ctx = ues.context(rnti).ok_or(MacError::UnknownUe(rnti))?;
        if !is_valid_subcarrier_count(subcarriers) {
            return Err(MacError::InvalidSubcarriers(subcarriers));
        }
        if interval_ms == 0 {
            return Err(MacError::InvalidInterval(interval_ms));
        }

        let params = sps_params(ctx.cqi, subcarriers, ctx.coverage_class);
        tracing::debug!("configure: {} every {} ms on {} subcarriers, mcs {} tbs {}",
            rnti, interval_ms, subcarriers, params.mcs, params.tbs_bits);
        self.configs.insert(rnti, SpsConfig {
            interval_ms,
            subcarriers,
            mcs: params.mcs,
            tbs_bits: params.tbs_bits,
            repetitions: params.repetitions,
            next_allocation: now,
            active: false,
            harq_process: SPS_HARQ_PROCESS,
            activated_at: None,
        });
        Ok(())
    }

    /// Starts periodic grants from `now`. A UE without a configuration gets the default one.
    pub fn activate(&mut self, ues: &UeTable, rnti: Rnti, now: SubframeTime) -> Result<(), MacError> {
        if !self.configs.contains_key(&rnti) {
            self.configure(ues, rnti, self.default_interval_ms, self.default_subcarriers, now)?;
        }
        let Some(cfg) = self.configs.get_mut(&rnti) else {
            return Err(MacError::NoSpsConfig(rnti));
        };
        cfg.active = true;
        cfg.next_allocation = now;
        cfg.activated_at = Some(now);
        tracing::debug!("activate: {} from {}", rnti, now);
        Ok(())
    }

    /// Stops periodic grants. The configuration is kept for a later activation.
    pub fn deactivate(&mut self, rnti: Rnti) -> Result<(), MacError> {
        let cfg = self.configs.get_mut(&rnti).ok_or(MacError::NoSpsConfig(rnti))?;
        cfg.active = false;
        tracing::debug!("deactivate: {}", rnti);
        Ok(())
    }

    pub fn is_active(&self, rnti: Rnti) -> bool {
        self.configs.get(&rnti).is_some_and(|c| c.active)
    }

    pub fn get_config(&self, rnti: Rnti) -> Option<SpsConfig> {
        self.configs.get(&rnti).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.configs.values().filter(|c| c.active).count()
    }

    pub fn remove(&mut self, rnti: Rnti) -> Option<SpsConfig> {
        self.configs.remove(&rnti)
    }

    pub fn stats(&self) -> SpsStats {
        self.stats
    }

    /// Issues up to `units` periodic grants that are due at `now`
    fn schedule_periodic(&mut self, ues: &mut UeTable, now: SubframeTime, units: usize) -> Vec<UlGrant> {
        let mut grants = Vec::new();
        for (&rnti, cfg) in self.configs.iter_mut() {
            if grants.len() >= units {
                break;
            }
            if !cfg.active || !cfg.next_allocation.has_elapsed(now) {
                continue;
            }
            if !ues.context(rnti).is_some_and(|c| c.connected) {
                continue;
            }

            // A bare scheduling request is not data; only reported backlog fills the grant
            let had_backlog = ues.context(rnti).is_some_and(|c| c.ul_backlog > 0);
            let had_pending_data = ues.consume_ul_grant(rnti, (cfg.tbs_bits / 8) as u32);
            if had_backlog {
                self.stats.data_transmissions += 1;
            } else {
                self.stats.padding_transmissions += 1;
            }
            grants.push(UlGrant {
                rnti,
                mcs: cfg.mcs,
                tbs_bits: cfg.tbs_bits,
                subcarriers: cfg.subcarriers,
                repetitions: cfg.repetitions,
                rv: 0,
                new_data: true,
                harq_process: cfg.harq_process,
                sps: true,
                had_pending_data,
            });
            cfg.next_allocation = cfg.next_allocation.add_subframes(cfg.interval_ms as i32);
            tracing::trace!("schedule_periodic: {} next at {}", rnti, cfg.next_allocation);
        }
        grants
    }

    /// Round robin over UEs not covered by an active configuration
    fn schedule_dynamic(&mut self, ues: &mut UeTable, units: usize) -> Vec<UlGrant> {
        let mut grants = Vec::new();
        while grants.len() < units {
            let selected = ues.round_robin_order(self.last_dynamic_ul)
                .into_iter()
                .filter(|rnti| !grants.iter().any(|g: &UlGrant| g.rnti == *rnti))
                .find(|&rnti| !self.is_active(rnti) && ues.is_eligible(rnti, Direction::Ul));
            let Some(rnti) = selected else {
                break;
            };
            self.last_dynamic_ul = Some(rnti);
            let Some(ctx) = ues.context(rnti) else {
                break;
            };
            let params = ul_params(ctx.cqi, ctx.coverage_class, FALLBACK_UL_REP_STEP);
            match build_ul_grant(ues, rnti, params) {
                Some(grant) => grants.push(grant),
                None => break,
            }
        }
        grants
    }
}

impl Scheduler for SpsScheduler {
    fn policy(&self) -> SchedulerPolicy {
        SchedulerPolicy::Sps
    }

    fn schedule_downlink(&mut self, ues: &mut UeTable, now: SubframeTime, available_units: usize) -> Vec<DlAssignment> {
        self.dl.schedule_downlink(ues, now, available_units)
    }

    fn schedule_uplink(&mut self, ues: &mut UeTable, now: SubframeTime, available_units: usize) -> Vec<UlGrant> {
        let mut grants = self.schedule_periodic(ues, now, available_units);
        let remaining = available_units.saturating_sub(grants.len());
        if remaining > 0 {
            grants.extend(self.schedule_dynamic(ues, remaining));
        }
        grants
    }

    fn ue_removed(&mut self, rnti: Rnti) {
        self.remove(rnti);
    }

    fn as_sps(&self) -> Option<&SpsScheduler> {
        Some(self)
    }

    fn as_sps_mut(&mut self) -> Option<&mut SpsScheduler> {
        Some(self)
    }
}
