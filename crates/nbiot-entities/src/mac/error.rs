use nbiot_core::Rnti;
use thiserror::Error;

/// Rejected MAC control requests
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacError {
    #[error("unknown UE {0}")]
    UnknownUe(Rnti),

    #[error("UE {0} already exists")]
    UeExists(Rnti),

    #[error("cell full, {max} UEs connected")]
    CellFull { max: usize },

    #[error("no C-RNTI available")]
    NoRntiAvailable,

    #[error("{0} subcarriers not supported")]
    InvalidSubcarriers(u8),

    #[error("SPS interval {0} ms not supported")]
    InvalidInterval(u32),

    #[error("SPS scheduling not enabled")]
    SpsNotEnabled,

    #[error("no SPS configuration for UE {0}")]
    NoSpsConfig(Rnti),

    #[error("SDU of {len} bytes exceeds maximum of {max}")]
    SduTooLarge { len: usize, max: usize },
}
