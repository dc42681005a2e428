use nbiot_core::{CoverageClass, Rnti, SubframeTime};

/// CQI assumed until the UE reports one
pub const DEFAULT_CQI: u8 = 7;

/// Scheduling state of one UE
#[derive(Debug, Clone)]
pub struct UeContext {
    pub rnti: Rnti,
    pub coverage_class: CoverageClass,
    /// Channel quality indicator, 0..=15
    pub cqi: u8,
    /// Uplink bytes waiting at the UE, as last reported and minus what was granted since
    pub ul_backlog: u32,
    /// Scheduling request received and not yet answered with a grant
    pub sr_pending: bool,
    pub connected: bool,
    pub last_activity: SubframeTime,
}

impl UeContext {
    pub fn new(rnti: Rnti, coverage_class: CoverageClass, now: SubframeTime) -> Self {
        Self {
            rnti,
            coverage_class,
            cqi: DEFAULT_CQI,
            ul_backlog: 0,
            sr_pending: false,
            connected: true,
            last_activity: now,
        }
    }

    /// UE wants to transmit on the uplink
    pub fn has_ul_demand(&self) -> bool {
        self.connected && (self.sr_pending || self.ul_backlog > 0)
    }

    pub fn report_buffer_status(&mut self, bytes: u32, now: SubframeTime) {
        self.ul_backlog = bytes;
        self.last_activity = now;
    }

    pub fn scheduling_request(&mut self, now: SubframeTime) {
        self.sr_pending = true;
        self.last_activity = now;
    }

    /// Accounts for an uplink grant of `bytes`. Returns whether the UE had data waiting.
    pub fn consume_ul_grant(&mut self, bytes: u32) -> bool {
        let had_data = self.sr_pending || self.ul_backlog > 0;
        self.ul_backlog = self.ul_backlog.saturating_sub(bytes);
        self.sr_pending = false;
        had_data
    }
}
