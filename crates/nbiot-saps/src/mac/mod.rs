use nbiot_core::{Lcid, Rnti};

/// RLC PDU to be sent to a UE on a logical channel
#[derive(Debug, Clone)]
pub struct MacSduReq {
    pub rnti: Rnti,
    pub lcid: Lcid,
    pub sdu: Vec<u8>,
}

/// RLC PDU received from a UE on a logical channel
#[derive(Debug, Clone)]
pub struct MacSduInd {
    pub rnti: Rnti,
    pub lcid: Lcid,
    pub sdu: Vec<u8>,
}
