use std::collections::VecDeque;

use nbiot_core::Lcid;

use super::mac_pdu::subheader_len;

/// An RLC PDU waiting for a downlink transport block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSdu {
    pub lcid: Lcid,
    pub payload: Vec<u8>,
}

impl QueuedSdu {
    pub fn new(lcid: Lcid, payload: Vec<u8>) -> Self {
        Self { lcid, payload }
    }

    /// Bytes this SDU takes in a MAC PDU, subheader included
    pub fn pdu_cost(&self) -> usize {
        subheader_len(self.lcid, self.payload.len()) + self.payload.len()
    }
}

/// Per-UE downlink FIFO. Items are only ever taken whole.
#[derive(Debug, Default)]
pub struct TxQueue {
    items: VecDeque<QueuedSdu>,
    /// Sum of payload bytes of all queued items
    bytes: usize,
}

impl TxQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sdu: QueuedSdu) {
        self.bytes += sdu.payload.len();
        self.items.push_back(sdu);
    }

    /// Puts previously drained items back at the head, keeping their order
    pub fn requeue_front(&mut self, sdus: Vec<QueuedSdu>) {
        for sdu in sdus.into_iter().rev() {
            self.bytes += sdu.payload.len();
            self.items.push_front(sdu);
        }
    }

    /// Payload size of the head item
    pub fn peek_size(&self) -> Option<usize> {
        self.items.front().map(|sdu| sdu.payload.len())
    }

    /// Bytes the head item takes in a MAC PDU
    pub fn head_cost(&self) -> Option<usize> {
        self.items.front().map(QueuedSdu::pdu_cost)
    }

    /// Pops the head item if it fits, with its subheader, in `remaining` bytes
    pub fn pop_if_fits(&mut self, remaining: usize) -> Option<QueuedSdu> {
        if self.items.front()?.pdu_cost() > remaining {
            return None;
        }
        let sdu = self.items.pop_front()?;
        self.bytes -= sdu.payload.len();
        Some(sdu)
    }

    /// Pops whole items from the head while they fit in `budget` bytes
    pub fn drain(&mut self, budget: usize) -> Vec<QueuedSdu> {
        let mut remaining = budget;
        let mut out = Vec::new();
        while let Some(sdu) = self.pop_if_fits(remaining) {
            remaining -= sdu.pdu_cost();
            out.push(sdu);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_takes_whole_items_only() {
        let mut q = TxQueue::new();
        q.push(QueuedSdu::new(2, vec![1; 5]));
        q.push(QueuedSdu::new(2, vec![2; 5]));
        q.push(QueuedSdu::new(2, vec![3; 5]));
        assert_eq!(q.byte_len(), 15);

        // 7 bytes per item with subheader; 20 bytes fit two, not a slice of the third
        let drained = q.drain(20);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].payload, vec![2; 5]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.byte_len(), 5);
        assert_eq!(q.peek_size(), Some(5));
    }

    #[test]
    fn test_head_too_large_blocks() {
        let mut q = TxQueue::new();
        q.push(QueuedSdu::new(2, vec![0; 30]));
        q.push(QueuedSdu::new(2, vec![0; 1]));
        assert!(q.drain(26).is_empty());
        assert_eq!(q.len(), 2);
        assert_eq!(q.head_cost(), Some(32));
    }

    #[test]
    fn test_requeue_front_restores_order() {
        let mut q = TxQueue::new();
        q.push(QueuedSdu::new(1, vec![1]));
        q.push(QueuedSdu::new(1, vec![2]));
        q.push(QueuedSdu::new(1, vec![3]));
        let drained = q.drain(6);
        assert_eq!(drained.len(), 2);
        q.requeue_front(drained);
        let all = q.drain(100);
        let order: Vec<u8> = all.iter().map(|s| s.payload[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(q.is_empty());
        assert_eq!(q.byte_len(), 0);
    }
}
