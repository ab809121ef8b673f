//! Sequence coverage tracking.
//!
//! A `CoverageSet` holds the union of every `[start, end)` sequence range a
//! flow has carried so far. Inserting a new range reports how many of its
//! units were already covered, which is what retransmission detection keys
//! off.

use std::collections::BTreeMap;

/// Disjoint, start-ordered set of half-open sequence ranges.
///
/// Keyed by interval start so that an insertion only touches the interval
/// immediately before the new range plus whatever it absorbs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageSet {
    intervals: BTreeMap<u64, u64>,
    covered: u64,
}

impl CoverageSet {
    pub fn new() -> Self {
        CoverageSet::default()
    }

    /// Insert `[start, end)` and return the number of units that were
    /// already covered before the call.
    ///
    /// Every stored interval that overlaps or touches the new range is merged
    /// with it. An empty or inverted range (`start >= end`) leaves the set
    /// untouched and returns 0.
    pub fn insert(&mut self, start: u64, end: u64) -> u64 {
        if start >= end {
            return 0;
        }

        // Only the closest interval starting at or before `start` can reach
        // into the new range from the left.
        let lower = self
            .intervals
            .range(..=start)
            .next_back()
            .filter(|(_, &e)| e >= start)
            .map(|(&s, _)| s)
            .unwrap_or(start);

        let absorbed: Vec<(u64, u64)> = self
            .intervals
            .range(lower..=end)
            .map(|(&s, &e)| (s, e))
            .collect();

        let mut overlap = 0u64;
        let mut merged_start = start;
        let mut merged_end = end;
        for (s, e) in absorbed {
            self.intervals.remove(&s);
            overlap += e.min(end).saturating_sub(s.max(start));
            merged_start = merged_start.min(s);
            merged_end = merged_end.max(e);
        }

        self.intervals.insert(merged_start, merged_end);
        self.covered += (end - start) - overlap;
        overlap
    }

    /// Number of disjoint intervals currently stored.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Total number of sequence units covered by the set.
    pub fn covered_len(&self) -> u64 {
        self.covered
    }

    /// Intervals in ascending start order.
    pub fn intervals(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.intervals.iter().map(|(&s, &e)| (s, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_disjoint_sorted(set: &CoverageSet) {
        let ivs: Vec<(u64, u64)> = set.intervals().collect();
        for pair in ivs.windows(2) {
            assert!(pair[0].0 < pair[1].0, "not sorted: {:?}", ivs);
            assert!(pair[0].1 <= pair[1].0, "overlapping: {:?}", ivs);
        }
        for (s, e) in &ivs {
            assert!(s < e);
        }
    }

    #[test]
    fn first_insert_has_no_overlap() {
        let mut set = CoverageSet::new();
        assert_eq!(set.insert(100, 200), 0);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(100, 200)]);
        assert_eq!(set.covered_len(), 100);
    }

    #[test]
    fn duplicate_range_overlaps_fully() {
        let mut set = CoverageSet::new();
        set.insert(0, 1448);
        assert_eq!(set.insert(0, 1448), 1448);
        assert_eq!(set.len(), 1);
        assert_eq!(set.covered_len(), 1448);
    }

    #[test]
    fn inverted_range_is_noop() {
        let mut set = CoverageSet::new();
        set.insert(10, 20);
        let before = set.clone();
        assert_eq!(set.insert(30, 30), 0);
        assert_eq!(set.insert(40, 35), 0);
        assert_eq!(set, before);
    }

    #[test]
    fn touching_ranges_are_unioned_without_overlap() {
        let mut set = CoverageSet::new();
        assert_eq!(set.insert(0, 10), 0);
        assert_eq!(set.insert(10, 20), 0);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(0, 20)]);
        assert_eq!(set.insert(30, 40), 0);
        assert_eq!(set.insert(20, 30), 0);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(0, 40)]);
    }

    #[test]
    fn partial_overlap_counts_only_shared_units() {
        let mut set = CoverageSet::new();
        set.insert(0, 10);
        assert_eq!(set.insert(5, 15), 5);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(0, 15)]);
        assert_eq!(set.covered_len(), 15);
    }

    #[test]
    fn bridging_range_absorbs_several_intervals() {
        let mut set = CoverageSet::new();
        set.insert(0, 10);
        set.insert(20, 30);
        set.insert(40, 50);
        set.insert(70, 80);
        assert_eq!(set.len(), 4);

        // [5, 45) shares 5 units with [0,10), 10 with [20,30), 5 with [40,50).
        assert_eq!(set.insert(5, 45), 20);
        assert_eq!(
            set.intervals().collect::<Vec<_>>(),
            vec![(0, 50), (70, 80)]
        );
        assert_eq!(set.covered_len(), 60);
        assert_disjoint_sorted(&set);
    }

    #[test]
    fn range_inside_hole_does_not_overlap() {
        let mut set = CoverageSet::new();
        set.insert(0, 10);
        set.insert(30, 40);
        assert_eq!(set.insert(15, 25), 0);
        assert_eq!(set.len(), 3);
        assert_disjoint_sorted(&set);
    }

    #[test]
    fn range_covering_everything_reports_all_previous_units() {
        let mut set = CoverageSet::new();
        set.insert(10, 20);
        set.insert(30, 35);
        assert_eq!(set.insert(0, 100), 15);
        assert_eq!(set.intervals().collect::<Vec<_>>(), vec![(0, 100)]);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Ranges laid out with gaps between them never overlap and their
        /// lengths add up.
        #[test]
        fn spaced_ranges_never_overlap(lens in prop::collection::vec((1u64..500, 1u64..50), 1..60)) {
            let mut set = CoverageSet::new();
            let mut cursor = 0u64;
            let mut total = 0u64;
            for (len, gap) in lens {
                prop_assert_eq!(set.insert(cursor, cursor + len), 0);
                total += len;
                cursor += len + gap;
            }
            prop_assert_eq!(set.covered_len(), total);
            let summed: u64 = set.intervals().map(|(s, e)| e - s).sum();
            prop_assert_eq!(summed, total);
        }

        /// Arbitrary insertion orders keep the set disjoint and sorted, and
        /// the overlap reported always matches a brute-force bitmap.
        #[test]
        fn matches_bitmap_model(ranges in prop::collection::vec((0u64..400, 0u64..60), 0..80)) {
            let mut set = CoverageSet::new();
            let mut bitmap = vec![false; 512];
            for (start, len) in ranges {
                let end = start + len;
                let expected = (start..end).filter(|&i| bitmap[i as usize]).count() as u64;
                prop_assert_eq!(set.insert(start, end), expected);
                for i in start..end {
                    bitmap[i as usize] = true;
                }

                let ivs: Vec<(u64, u64)> = set.intervals().collect();
                for pair in ivs.windows(2) {
                    prop_assert!(pair[0].1 <= pair[1].0);
                }
                let covered = bitmap.iter().filter(|b| **b).count() as u64;
                prop_assert_eq!(set.covered_len(), covered);
            }
        }
    }
}
