use core::fmt;

/// NB-IoT coverage enhancement level. Higher levels need more repetitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CoverageClass {
    /// Normal coverage
    #[default]
    Ce0,
    /// Robust coverage
    Ce1,
    /// Extreme coverage
    Ce2,
}

impl CoverageClass {
    pub fn index(self) -> usize {
        match self {
            CoverageClass::Ce0 => 0,
            CoverageClass::Ce1 => 1,
            CoverageClass::Ce2 => 2,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(CoverageClass::Ce0),
            1 => Some(CoverageClass::Ce1),
            2 => Some(CoverageClass::Ce2),
            _ => None,
        }
    }
}

impl fmt::Display for CoverageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoverageClass::Ce0 => write!(f, "CE0"),
            CoverageClass::Ce1 => write!(f, "CE1"),
            CoverageClass::Ce2 => write!(f, "CE2"),
        }
    }
}
