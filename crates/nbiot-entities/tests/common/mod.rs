#![allow(dead_code)]

pub mod component_test;
pub mod sink;

pub use component_test::{ComponentTest, Recorder, default_test_config};
pub use sink::Sink;

use nbiot_saps::phy::{PhyDlTxReq, PhyUlGrantReq};
use nbiot_saps::sapmsg::{SapMsg, SapMsgInner};

/// Downlink transmissions among `msgs`, in delivery order
pub fn dl_txs(msgs: &[SapMsg]) -> Vec<&PhyDlTxReq> {
    msgs.iter().filter_map(|m| match &m.msg {
        SapMsgInner::PhyDlTxReq(req) => Some(req),
        _ => None,
    }).collect()
}

/// Uplink grants among `msgs`, with the subframe they were issued in
pub fn ul_grants(msgs: &[SapMsg]) -> Vec<(u64, &PhyUlGrantReq)> {
    msgs.iter().filter_map(|m| match &m.msg {
        SapMsgInner::PhyUlGrantReq(req) => Some((m.ts.to_ms(), req)),
        _ => None,
    }).collect()
}
