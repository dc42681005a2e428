use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum Direction {
    /// eNB to UE
    Dl,
    /// UE to eNB
    Ul,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Dl => write!(f, "DL"),
            Direction::Ul => write!(f, "UL"),
        }
    }
}
