pub mod harq;
pub mod mac_pdu;
pub mod sched;
pub mod tx_queue;
pub mod ue_context;
pub mod ue_table;
