use nbiot_core::{CoverageClass, Direction, HarqProcessId, Rnti};

/// Deferred MAC actions, delivered back to the MAC through the event queue
#[derive(Debug, Clone)]
pub enum MacTimer {
    /// Random access response is due for a detected preamble
    RarDue {
        preamble_id: u8,
        timing_advance: u16,
        coverage_class: CoverageClass,
    },
    /// Retransmission window for a NACKed HARQ process has passed
    RetxDue {
        rnti: Rnti,
        direction: Direction,
        harq_process: HarqProcessId,
    },
}
