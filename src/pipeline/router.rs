//! Shard selection for flows.
//!
//! Every packet of a flow is analysed by one worker, so routing happens on
//! whole flows keyed by their stream id.

use std::hash::{Hash, Hasher};

use crate::packet::FlowId;

/// Compute `shard = hash(flow_id) % num_shards`.
///
/// Stream ids are small consecutive integers; hashing spreads them so a
/// capture dominated by a few large flows does not pile onto one shard by
/// accident of numbering.
#[inline]
pub fn shard_for_flow(flow_id: FlowId, num_shards: usize) -> usize {
    if num_shards == 0 {
        return 0;
    }
    let mut hasher = ahash::AHasher::default();
    flow_id.hash(&mut hasher);
    (hasher.finish() as usize) % num_shards
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_flow_same_shard() {
        for id in 0..64 {
            assert_eq!(shard_for_flow(id, 7), shard_for_flow(id, 7));
        }
    }

    #[test]
    fn shard_in_range() {
        for id in 0..1000 {
            assert!(shard_for_flow(id, 4) < 4);
        }
    }

    #[test]
    fn zero_shards_no_panic() {
        assert_eq!(shard_for_flow(12, 0), 0);
        assert_eq!(shard_for_flow(12, 1), 0);
    }
}
