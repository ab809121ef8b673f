//! Per-flow retransmission / reordering classification.

use serde::Serialize;

use super::coverage::CoverageSet;
use super::order::{OrderTracker, SegmentGapTracker};
use crate::packet::PacketRecord;

/// Flags for a single packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketFlags {
    pub retransmission: bool,
    pub out_of_order: bool,
    pub lost_segment: bool,
}

/// Classification of one flow, aligned index-for-index with its packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub retransmissions: u64,
    pub out_of_order: u64,
    pub lost_segments: u64,
    pub is_retransmission: Vec<bool>,
    pub is_out_of_order: Vec<bool>,
    pub is_lost_segment: Vec<bool>,
}

impl Classification {
    fn with_capacity(n: usize) -> Self {
        Classification {
            retransmissions: 0,
            out_of_order: 0,
            lost_segments: 0,
            is_retransmission: Vec::with_capacity(n),
            is_out_of_order: Vec::with_capacity(n),
            is_lost_segment: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, flags: PacketFlags) {
        self.retransmissions += u64::from(flags.retransmission);
        self.out_of_order += u64::from(flags.out_of_order);
        self.lost_segments += u64::from(flags.lost_segment);
        self.is_retransmission.push(flags.retransmission);
        self.is_out_of_order.push(flags.out_of_order);
        self.is_lost_segment.push(flags.lost_segment);
    }

    pub fn len(&self) -> usize {
        self.is_retransmission.len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_retransmission.is_empty()
    }
}

/// Streaming classifier for one flow. Feed packets in arrival order.
#[derive(Debug, Default)]
pub struct FlowClassifier {
    coverage: CoverageSet,
    order: OrderTracker,
    gaps: SegmentGapTracker,
}

impl FlowClassifier {
    pub fn new() -> Self {
        FlowClassifier::default()
    }

    pub fn observe(&mut self, packet: &PacketRecord) -> PacketFlags {
        let out_of_order = self.order.observe(packet.seq);
        let lost_segment = self.gaps.observe(packet.seq, packet.payload_len);

        let retransmission = if packet.payload_len > 0 {
            let end = packet.seq.saturating_add(u64::from(packet.payload_len));
            self.coverage.insert(packet.seq, end) > 0
        } else {
            false
        };

        PacketFlags {
            retransmission,
            out_of_order,
            lost_segment,
        }
    }

    /// Sequence ranges seen so far.
    pub fn coverage(&self) -> &CoverageSet {
        &self.coverage
    }
}

/// Classify every packet of one flow.
///
/// `packets` must already be in arrival order (stable on equal timestamps).
pub fn classify(packets: &[PacketRecord]) -> Classification {
    let mut classifier = FlowClassifier::new();
    let mut out = Classification::with_capacity(packets.len());
    for packet in packets {
        out.push(classifier.observe(packet));
    }
    tracing::trace!(
        packets = packets.len(),
        intervals = classifier.coverage().len(),
        "flow classified"
    );
    out
}
