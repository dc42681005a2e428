//! Selection of MCS, transport block size and repetitions from UE channel state

use nbiot_core::CoverageClass;
use nbiot_core::phy_tables::{npdsch_repetitions, npusch_repetitions, tbs_bits};

use crate::mac::subcomp::mac_pdu::subheader_len;
use crate::mac::subcomp::mac_pdu::lcid;

/// Highest MCS used on NPDSCH
pub const MAX_DL_MCS: u8 = 10;
/// Highest MCS used on NPUSCH
pub const MAX_UL_MCS: u8 = 7;
/// Full-carrier NPUSCH allocation used for dynamic grants
pub const UL_SUBCARRIERS: u8 = 12;
/// Smallest transport block
pub const MIN_TBS_BITS: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub mcs: u8,
    pub tbs_bits: u16,
    pub repetitions: u16,
}

impl LinkParams {
    pub fn tbs_bytes(&self) -> usize {
        self.tbs_bits as usize / 8
    }
}

/// Downlink parameters. `rep_step` sets how many NPDSCH repetition
/// table entries each coverage class moves up.
pub fn dl_params(cqi: u8, cc: CoverageClass, rep_step: usize) -> LinkParams {
    let mcs = cqi.min(MAX_DL_MCS);
    LinkParams {
        mcs,
        tbs_bits: tbs_bits(mcs),
        repetitions: npdsch_repetitions(cc.index() * rep_step),
    }
}

/// Downlink block size in bytes at `cqi`. Repetitions do not change it.
pub fn dl_block_bytes(cqi: u8) -> usize {
    tbs_bits(cqi.min(MAX_DL_MCS)) as usize / 8
}

/// Uplink parameters for a dynamic full-carrier grant
pub fn ul_params(cqi: u8, cc: CoverageClass, rep_step: usize) -> LinkParams {
    let mcs = (cqi / 2).min(MAX_UL_MCS);
    LinkParams {
        mcs,
        tbs_bits: tbs_bits(mcs),
        repetitions: npusch_repetitions(cc.index() * rep_step),
    }
}

/// Coarse CQI to (MCS, TBS) mapping for semi-persistent grants.
/// Allocations narrower than the full carrier scale the TBS down, with a floor.
pub fn sps_params(cqi: u8, subcarriers: u8, cc: CoverageClass) -> LinkParams {
    let (mcs, full_tbs): (u8, u16) = match cqi {
        0..=3 => (0, 16),
        4..=5 => (2, 56),
        6..=8 => (4, 88),
        9..=11 => (6, 152),
        _ => (8, 256),
    };
    let tbs_bits = if subcarriers < UL_SUBCARRIERS {
        (full_tbs as u32 * subcarriers as u32 / UL_SUBCARRIERS as u32).max(MIN_TBS_BITS as u32) as u16
    } else {
        full_tbs
    };
    LinkParams {
        mcs,
        tbs_bits,
        repetitions: npusch_repetitions(cc.index()),
    }
}

/// Largest SDU that fits a downlink transport block at the highest DL MCS
pub fn max_dl_sdu_len() -> usize {
    let budget = tbs_bits(MAX_DL_MCS) as usize / 8;
    budget - subheader_len(lcid::DTCH, budget)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dl_params() {
        let p = dl_params(7, CoverageClass::Ce0, 2);
        assert_eq!(p, LinkParams { mcs: 7, tbs_bits: 208, repetitions: 1 });
        let p = dl_params(15, CoverageClass::Ce2, 2);
        assert_eq!(p, LinkParams { mcs: 10, tbs_bits: 408, repetitions: 5 });
        let p = dl_params(15, CoverageClass::Ce2, 3);
        assert_eq!(p.repetitions, 7);
        assert_eq!(p.tbs_bytes(), 51);
        assert_eq!(dl_block_bytes(1), 4);
        assert_eq!(dl_block_bytes(14), 51);
    }

    #[test]
    fn test_ul_params() {
        let p = ul_params(7, CoverageClass::Ce1, 1);
        assert_eq!(p, LinkParams { mcs: 3, tbs_bits: 88, repetitions: 2 });
        let p = ul_params(15, CoverageClass::Ce2, 2);
        assert_eq!(p, LinkParams { mcs: 7, tbs_bits: 208, repetitions: 16 });
    }

    #[test]
    fn test_sps_params() {
        assert_eq!(sps_params(7, 12, CoverageClass::Ce0), LinkParams { mcs: 4, tbs_bits: 88, repetitions: 1 });
        assert_eq!(sps_params(2, 12, CoverageClass::Ce0).tbs_bits, 16);
        assert_eq!(sps_params(13, 6, CoverageClass::Ce0).tbs_bits, 128);
        // 88 * 3 / 12 = 22
        assert_eq!(sps_params(7, 3, CoverageClass::Ce1), LinkParams { mcs: 4, tbs_bits: 22, repetitions: 2 });
        // 56 / 12 floors at the minimum block
        assert_eq!(sps_params(5, 1, CoverageClass::Ce0).tbs_bits, 16);
    }

    #[test]
    fn test_max_dl_sdu() {
        assert_eq!(max_dl_sdu_len(), 49);
    }
}
