use nbiot_core::{CoverageClass, Rnti};

/// MAC informs RRC that a UE completed random access
#[derive(Debug, Clone)]
pub struct CmacUeConnectedInd {
    pub rnti: Rnti,
    pub coverage_class: CoverageClass,
}

/// RRC releases a UE. The MAC drops all state held for it.
#[derive(Debug, Clone)]
pub struct CmacUeReleaseReq {
    pub rnti: Rnti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpsAction {
    /// Create or overwrite a deactivated configuration
    Configure { interval_ms: u32, subcarriers: u8 },
    Activate,
    Deactivate,
}

/// RRC request to change the semi-persistent allocation of a UE
#[derive(Debug, Clone)]
pub struct CmacSpsReq {
    pub rnti: Rnti,
    pub action: SpsAction,
}

/// Outcome of a CmacSpsReq
#[derive(Debug, Clone)]
pub struct CmacSpsConf {
    pub rnti: Rnti,
    pub action: SpsAction,
    pub accepted: bool,
    /// SPS state after the request was handled
    pub active: bool,
}
