// Protocol entities of the eNB stack
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy)]
pub enum NbIotEntity {
    /// Physical layer
    Phy,
    /// Medium access control
    Mac,
    /// Radio link control
    Rlc,
    /// Radio resource control
    Rrc,
}
