//! NB-IoT physical layer lookup tables used by the MAC for link adaptation

/// NPDSCH repetition counts, 36.213 Table 16.4.1.3-2
pub const NPDSCH_REPETITIONS: [u16; 17] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 14, 16, 20, 24, 28, 32];

/// NPUSCH format 1 repetition counts
pub const NPUSCH_FORMAT1_REPETITIONS: [u16; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Transport block size in bits, indexed by MCS (single resource unit)
pub const TBS_TABLE_BITS: [u16; 14] = [16, 32, 56, 88, 120, 152, 184, 208, 256, 328, 408, 504, 584, 680];

/// Allowed NPUSCH subcarrier allocations
pub const NPUSCH_SUBCARRIER_OPTIONS: [u8; 4] = [1, 3, 6, 12];

/// Highest MCS with an entry in TBS_TABLE_BITS
pub const MAX_TBS_INDEX: u8 = (TBS_TABLE_BITS.len() - 1) as u8;

pub fn npdsch_repetitions(idx: usize) -> u16 {
    NPDSCH_REPETITIONS[idx.min(NPDSCH_REPETITIONS.len() - 1)]
}

pub fn npusch_repetitions(idx: usize) -> u16 {
    NPUSCH_FORMAT1_REPETITIONS[idx.min(NPUSCH_FORMAT1_REPETITIONS.len() - 1)]
}

pub fn tbs_bits(mcs: u8) -> u16 {
    TBS_TABLE_BITS[mcs.min(MAX_TBS_INDEX) as usize]
}

pub fn is_valid_subcarrier_count(subcarriers: u8) -> bool {
    NPUSCH_SUBCARRIER_OPTIONS.contains(&subcarriers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(npdsch_repetitions(0), 1);
        assert_eq!(npdsch_repetitions(99), 32);
        assert_eq!(npusch_repetitions(2), 4);
        assert_eq!(npusch_repetitions(99), 128);
        assert_eq!(tbs_bits(3), 88);
        assert_eq!(tbs_bits(200), 680);
        assert!(is_valid_subcarrier_count(6));
        assert!(!is_valid_subcarrier_count(4));
    }
}
