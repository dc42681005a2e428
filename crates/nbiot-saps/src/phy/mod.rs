use nbiot_core::{CoverageClass, HarqProcessId, Rnti};

/// Request to transmit a transport block on NPDSCH
#[derive(Debug, Clone)]
pub struct PhyDlTxReq {
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub mcs: u8,
    /// Transport block size in bits
    pub tbs_bits: u16,
    pub repetitions: u16,
    /// Redundancy version, 0..=3
    pub rv: u8,
    /// False for a retransmission of the buffered block
    pub new_data: bool,
    pub pdu: Vec<u8>,
}

/// Uplink grant (DCI format N0) for a UE
#[derive(Debug, Clone)]
pub struct PhyUlGrantReq {
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub mcs: u8,
    /// Transport block size in bits
    pub tbs_bits: u16,
    /// NPUSCH subcarriers, one of 1/3/6/12
    pub subcarriers: u8,
    pub repetitions: u16,
    pub rv: u8,
    pub new_data: bool,
    /// Grant issued from a semi-persistent allocation
    pub sps: bool,
}

/// Random access response for a detected preamble
#[derive(Debug, Clone)]
pub struct PhyRarReq {
    pub preamble_id: u8,
    pub timing_advance: u16,
    /// C-RNTI assigned to the UE
    pub temp_crnti: Rnti,
    pub repetitions: u16,
}

/// NPRACH preamble detected
#[derive(Debug, Clone)]
pub struct PhyPrachInd {
    pub preamble_id: u8,
    pub timing_advance: u16,
    /// Coverage level derived from the NPRACH resource the preamble was received on
    pub coverage_class: CoverageClass,
}

/// HARQ ACK/NACK for a downlink transport block
#[derive(Debug, Clone)]
pub struct PhyHarqFeedbackInd {
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub ack: bool,
}

/// Decoded (or failed) NPUSCH transport block
#[derive(Debug, Clone)]
pub struct PhyUlDataInd {
    pub rnti: Rnti,
    pub harq_process: HarqProcessId,
    pub crc_ok: bool,
    pub pdu: Vec<u8>,
}

/// Scheduling request
#[derive(Debug, Clone)]
pub struct PhySrInd {
    pub rnti: Rnti,
}

/// Buffer status report received outside a MAC PDU
#[derive(Debug, Clone)]
pub struct PhyBsrInd {
    pub rnti: Rnti,
    /// Reported uplink backlog in bytes
    pub buffer_size: u32,
}

/// Channel quality report
#[derive(Debug, Clone)]
pub struct PhyCqiInd {
    pub rnti: Rnti,
    pub cqi: u8,
    /// Set when the UE moved to another coverage level
    pub coverage_class: Option<CoverageClass>,
}
