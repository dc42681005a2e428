// SAPs between the entities of the stack
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sap {
    /// PHY/MAC, transport channels
    PhySap,

    /// MAC/RLC, logical channels
    MacSap,

    /// RRC/MAC control
    CmacSap,

    /// Custom SAP for inter-entity control messages and timers
    Control
}
