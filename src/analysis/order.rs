//! Arrival-order checks on sequence numbers.

/// True when `seq` arrived after a packet carrying a higher sequence number.
///
/// Equal sequence numbers are not considered out of order.
#[inline]
pub fn is_out_of_order(prev_seq: Option<u64>, seq: u64) -> bool {
    matches!(prev_seq, Some(prev) if seq < prev)
}

/// Remembers the previous packet's sequence number for one flow.
#[derive(Debug, Clone, Default)]
pub struct OrderTracker {
    last_seq: Option<u64>,
}

impl OrderTracker {
    pub fn new() -> Self {
        OrderTracker::default()
    }

    /// Classify `seq` against the previous packet, then remember it.
    pub fn observe(&mut self, seq: u64) -> bool {
        let ooo = is_out_of_order(self.last_seq, seq);
        self.last_seq = Some(seq);
        ooo
    }
}

/// Flags segments that start beyond everything the flow has carried so far,
/// i.e. the capture is missing the bytes in between.
#[derive(Debug, Clone, Default)]
pub struct SegmentGapTracker {
    next_expected: Option<u64>,
}

impl SegmentGapTracker {
    pub fn new() -> Self {
        SegmentGapTracker::default()
    }

    /// Returns true when a hole precedes `[seq, seq + payload_len)`.
    ///
    /// Zero-length segments never open a hole and do not move the frontier.
    /// Ranges running past `u64::MAX` are clipped there.
    pub fn observe(&mut self, seq: u64, payload_len: u32) -> bool {
        if payload_len == 0 {
            return false;
        }
        let end = seq.saturating_add(u64::from(payload_len));
        match self.next_expected {
            None => {
                self.next_expected = Some(end);
                false
            }
            Some(expected) => {
                self.next_expected = Some(expected.max(end));
                seq > expected
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// A non-decreasing sequence never produces an out-of-order flag.
        #[test]
        fn monotonic_sequences_stay_in_order(mut seqs in prop::collection::vec(0u64..1_000_000, 0..100)) {
            seqs.sort_unstable();
            let mut tracker = OrderTracker::new();
            for seq in seqs {
                prop_assert!(!tracker.observe(seq));
            }
        }

        /// Contiguous segments never open a hole.
        #[test]
        fn contiguous_segments_have_no_holes(lens in prop::collection::vec(1u32..1500, 1..100)) {
            let mut gaps = SegmentGapTracker::new();
            let mut seq = 0u64;
            for len in lens {
                prop_assert!(!gaps.observe(seq, len));
                seq += u64::from(len);
            }
        }
    }
}
