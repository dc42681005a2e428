use serde::Deserialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nbiot_core::phy_tables::{NPUSCH_SUBCARRIER_OPTIONS, is_valid_subcarrier_count};
use nbiot_core::rnti::{C_RNTI_MIN, C_RNTI_RESERVED};

use crate::ConfigError;

/// Scheduling policy used by the eNB MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPolicy {
    #[default]
    RoundRobin,
    CoverageClass,
    Sps,
}

impl core::fmt::Display for SchedulerPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SchedulerPolicy::RoundRobin => write!(f, "round_robin"),
            SchedulerPolicy::CoverageClass => write!(f, "coverage_class"),
            SchedulerPolicy::Sps => write!(f, "sps"),
        }
    }
}

pub const HARQ_PROCESSES_MAX: usize = 8;
pub const HARQ_MAX_TRANSMISSIONS_MAX: u8 = 16;

#[derive(Debug, Clone)]
pub struct CfgCell {
    pub cell_id: u16,
    /// Upper bound on simultaneously connected UEs
    pub max_ues: usize,
}

impl Default for CfgCell {
    fn default() -> Self {
        Self { cell_id: 0, max_ues: 64 }
    }
}

#[derive(Debug, Clone)]
pub struct CfgMac {
    pub scheduler: SchedulerPolicy,
    /// Delay between a PRACH preamble and the random access response
    pub rar_delay_subframes: u32,
}

impl Default for CfgMac {
    fn default() -> Self {
        Self { scheduler: SchedulerPolicy::RoundRobin, rar_delay_subframes: 3 }
    }
}

#[derive(Debug, Clone)]
pub struct CfgHarq {
    /// Size of each UE's HARQ process pool, per direction
    pub num_processes: usize,
    /// Transmissions (first + retransmissions) before a process gives up
    pub max_transmissions: u8,
    /// Delay between a NACK and the retransmission opportunity
    pub retx_delay_subframes: u32,
}

impl Default for CfgHarq {
    fn default() -> Self {
        Self { num_processes: 2, max_transmissions: 8, retx_delay_subframes: 4 }
    }
}

#[derive(Debug, Clone)]
pub struct CfgSps {
    pub default_interval_ms: u32,
    pub default_subcarriers: u8,
    /// Activate SPS for every UE as soon as it connects
    pub auto_activate: bool,
}

impl Default for CfgSps {
    fn default() -> Self {
        Self { default_interval_ms: 20, default_subcarriers: 12, auto_activate: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    pub debug_log: Option<String>,
    pub cell: CfgCell,
    pub mac: CfgMac,
    pub harq: CfgHarq,
    pub sps: CfgSps,
}

impl StackConfig {
    pub fn new(scheduler: SchedulerPolicy) -> Self {
        let mut cfg = StackConfig::default();
        cfg.mac.scheduler = scheduler;
        cfg
    }

    /// Validate all fields. Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_rntis = (C_RNTI_RESERVED - C_RNTI_MIN) as i64;
        ConfigError::check_range("cell.max_ues", self.cell.max_ues as i64, 1, max_rntis)?;

        ConfigError::check_range("mac.rar_delay_subframes", self.mac.rar_delay_subframes, 1, 64)?;

        ConfigError::check_range("harq.num_processes", self.harq.num_processes as i64, 1, HARQ_PROCESSES_MAX as i64)?;
        ConfigError::check_range("harq.max_transmissions", self.harq.max_transmissions, 1, HARQ_MAX_TRANSMISSIONS_MAX)?;
        ConfigError::check_range("harq.retx_delay_subframes", self.harq.retx_delay_subframes, 1, 64)?;

        ConfigError::check_range("sps.default_interval_ms", self.sps.default_interval_ms, 1, 10240)?;
        if !is_valid_subcarrier_count(self.sps.default_subcarriers) {
            return Err(ConfigError::InvalidValue {
                field: "sps.default_subcarriers",
                reason: format!("{} not one of {:?}", self.sps.default_subcarriers, NPUSCH_SUBCARRIER_OPTIONS),
            });
        }

        Ok(())
    }
}

/// Mutable, stack-editable state (lock-protected).
#[derive(Debug, Clone, Default)]
pub struct StackState {
    /// Number of UEs currently known to the MAC
    pub connected_ues: usize,
    /// Number of UEs with an active SPS allocation
    pub active_sps: usize,
}

/// Global shared configuration: immutable config + mutable state.
#[derive(Clone)]
pub struct SharedConfig {
    /// Read-only configuration (immutable after construction).
    cfg: Arc<StackConfig>,
    /// Mutable state guarded with RwLock (write by the stack, read by others).
    state: Arc<RwLock<StackState>>,
}

impl SharedConfig {
    pub fn new(scheduler: SchedulerPolicy) -> Result<Self, ConfigError> {
        Self::from_config(StackConfig::new(scheduler))
    }

    /// Validates the config before wrapping it
    pub fn from_config(cfg: StackConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg: Arc::new(cfg),
            state: Arc::new(RwLock::new(StackState::default())),
        })
    }

    /// Access immutable config.
    pub fn config(&self) -> Arc<StackConfig> {
        Arc::clone(&self.cfg)
    }

    /// Read guard for mutable state. A poisoned lock still yields the last written state.
    pub fn state_read(&self) -> RwLockReadGuard<'_, StackState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write guard for mutable state.
    pub fn state_write(&self) -> RwLockWriteGuard<'_, StackState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}
