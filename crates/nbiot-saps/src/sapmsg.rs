use core::fmt::Display;

use nbiot_core::Sap;
use nbiot_core::SubframeTime;
use nbiot_core::nbiot_entities::NbIotEntity;

use super::cmac::*;
use super::control::MacTimer;
use super::mac::*;
use super::phy::*;


/// Exhaustive list of primitives for use in the SapMsg struct
#[derive(Debug)]
pub enum SapMsgInner {

    // PHY-SAP, MAC -> PHY
    PhyDlTxReq(PhyDlTxReq),
    PhyUlGrantReq(PhyUlGrantReq),
    PhyRarReq(PhyRarReq),

    // PHY-SAP, PHY -> MAC
    PhyPrachInd(PhyPrachInd),
    PhyHarqFeedbackInd(PhyHarqFeedbackInd),
    PhyUlDataInd(PhyUlDataInd),
    PhySrInd(PhySrInd),
    PhyBsrInd(PhyBsrInd),
    PhyCqiInd(PhyCqiInd),

    // MAC-SAP
    MacSduReq(MacSduReq),
    MacSduInd(MacSduInd),

    // CMAC-SAP
    CmacUeConnectedInd(CmacUeConnectedInd),
    CmacUeReleaseReq(CmacUeReleaseReq),
    CmacSpsReq(CmacSpsReq),
    CmacSpsConf(CmacSpsConf),

    // Control
    MacTimer(MacTimer),
}

impl Display for SapMsgInner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SapMsgInner::PhyDlTxReq(_) => write!(f, "PhyDlTxReq"),
            SapMsgInner::PhyUlGrantReq(_) => write!(f, "PhyUlGrantReq"),
            SapMsgInner::PhyRarReq(_) => write!(f, "PhyRarReq"),
            SapMsgInner::PhyPrachInd(_) => write!(f, "PhyPrachInd"),
            SapMsgInner::PhyHarqFeedbackInd(_) => write!(f, "PhyHarqFeedbackInd"),
            SapMsgInner::PhyUlDataInd(_) => write!(f, "PhyUlDataInd"),
            SapMsgInner::PhySrInd(_) => write!(f, "PhySrInd"),
            SapMsgInner::PhyBsrInd(_) => write!(f, "PhyBsrInd"),
            SapMsgInner::PhyCqiInd(_) => write!(f, "PhyCqiInd"),
            SapMsgInner::MacSduReq(_) => write!(f, "MacSduReq"),
            SapMsgInner::MacSduInd(_) => write!(f, "MacSduInd"),
            SapMsgInner::CmacUeConnectedInd(_) => write!(f, "CmacUeConnectedInd"),
            SapMsgInner::CmacUeReleaseReq(_) => write!(f, "CmacUeReleaseReq"),
            SapMsgInner::CmacSpsReq(_) => write!(f, "CmacSpsReq"),
            SapMsgInner::CmacSpsConf(_) => write!(f, "CmacSpsConf"),
            SapMsgInner::MacTimer(_) => write!(f, "MacTimer"),
        }
    }
}

#[derive(Debug)]
pub struct SapMsg {
    pub sap: Sap,
    pub src: NbIotEntity,
    pub dest: NbIotEntity,
    /// Time at which the message was created
    pub ts: SubframeTime,

    pub msg: SapMsgInner
}

impl SapMsg {
    pub fn new(
        sap: Sap,
        src: NbIotEntity,
        dest: NbIotEntity,
        ts: SubframeTime,
        msg: SapMsgInner
    ) -> Self {
        Self { sap, src, dest, ts, msg }
    }

    pub fn get_source(&self) -> &NbIotEntity {
        &self.src
    }
    pub fn get_dest(&self) -> &NbIotEntity {
        &self.dest
    }
    pub fn get_sap(&self) -> &Sap {
        &self.sap
    }
}
