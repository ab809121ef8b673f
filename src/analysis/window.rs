//! Fixed-width time binning of a flow's packet timeline.
//!
//! Bin `k` covers `[t0 + k*w, t0 + (k+1)*w)` where `t0` is the earliest
//! timestamp of the flow. Every index from 0 up to the last populated bin is
//! reported, so quiet periods show up as explicit zero-count bins.

use serde::Serialize;
use std::time::Duration;

use super::classify::Classification;
use super::stats::{quantile_sorted, Distribution, StatsError};

/// A strictly positive bin width, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinWidth(f64);

impl BinWidth {
    /// Returns `None` for a zero duration.
    pub fn new(width: Duration) -> Option<Self> {
        if width.is_zero() {
            None
        } else {
            Some(BinWidth(width.as_secs_f64()))
        }
    }

    pub fn from_micros(us: u64) -> Option<Self> {
        BinWidth::new(Duration::from_micros(us))
    }

    pub fn from_millis(ms: u64) -> Option<Self> {
        BinWidth::new(Duration::from_millis(ms))
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0
    }
}

/// Bin index of every packet.
#[derive(Debug, Clone, PartialEq)]
pub struct BinAssignment {
    pub origin: f64,
    pub width: BinWidth,
    pub index: Vec<usize>,
    pub n_bins: usize,
}

impl BinAssignment {
    /// Start time of bin `k`.
    pub fn bin_start(&self, k: usize) -> f64 {
        self.origin + k as f64 * self.width.0
    }
}

pub fn assign_bins(timestamps: &[f64], width: BinWidth) -> BinAssignment {
    let origin = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
    let index: Vec<usize> = timestamps
        .iter()
        .map(|&t| ((t - origin) / width.0).floor() as usize)
        .collect();
    let n_bins = index.iter().max().map_or(0, |&max| max + 1);
    BinAssignment {
        origin: if timestamps.is_empty() { 0.0 } else { origin },
        width,
        index,
        n_bins,
    }
}

/// Packet count per bin plus, for each event series, how many flagged
/// packets fell into the bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinCounts {
    pub packets: Vec<u64>,
    pub events: Vec<Vec<u64>>,
}

pub fn count_bins(bins: &BinAssignment, events: &[&[bool]]) -> BinCounts {
    let mut packets = vec![0u64; bins.n_bins];
    for &k in &bins.index {
        packets[k] += 1;
    }

    let events = events
        .iter()
        .map(|flags| {
            debug_assert_eq!(flags.len(), bins.index.len());
            let mut per_bin = vec![0u64; bins.n_bins];
            for (&k, &flag) in bins.index.iter().zip(flags.iter()) {
                per_bin[k] += u64::from(flag);
            }
            per_bin
        })
        .collect();

    BinCounts { packets, events }
}

/// Distribution of packets-per-bin over the whole flow.
pub fn packets_per_bin_distribution(
    timestamps: &[f64],
    width: BinWidth,
) -> Result<Distribution, StatsError> {
    let bins = assign_bins(timestamps, width);
    let counts = count_bins(&bins, &[]);
    let samples: Vec<f64> = counts.packets.iter().map(|&c| c as f64).collect();
    Distribution::from_samples(&samples)
}

/// `t[i] - t[i-1]` for every consecutive pair, in seconds.
pub fn inter_packet_gaps(timestamps: &[f64]) -> Vec<f64> {
    timestamps.windows(2).map(|w| w[1] - w[0]).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GapQuantiles {
    pub p1: f64,
    pub p50: f64,
    pub p99: f64,
}

/// Gap quantiles of a single bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BinGaps {
    /// No packet pair ended in this bin.
    NoData,
    Measured(GapQuantiles),
}

impl BinGaps {
    pub fn measured(&self) -> Option<GapQuantiles> {
        match self {
            BinGaps::NoData => None,
            BinGaps::Measured(q) => Some(*q),
        }
    }
}

/// p1/p50/p99 of the gaps ending in each bin.
///
/// `gaps[i - 1]` is the gap that ends at packet `i`, so it belongs to
/// `bins.index[i]`; the first packet contributes no gap.
pub fn gap_quantiles_per_bin(gaps: &[f64], bins: &BinAssignment) -> Vec<BinGaps> {
    let mut grouped: Vec<Vec<f64>> = vec![Vec::new(); bins.n_bins];
    for (&k, &gap) in bins.index.iter().skip(1).zip(gaps.iter()) {
        grouped[k].push(gap);
    }

    grouped
        .into_iter()
        .map(|mut in_bin| match in_bin.len() {
            0 => BinGaps::NoData,
            1 => BinGaps::Measured(GapQuantiles {
                p1: in_bin[0],
                p50: in_bin[0],
                p99: in_bin[0],
            }),
            _ => {
                in_bin.sort_unstable_by(|a, b| a.total_cmp(b));
                BinGaps::Measured(GapQuantiles {
                    p1: quantile_sorted(&in_bin, 0.01),
                    p50: quantile_sorted(&in_bin, 0.50),
                    p99: quantile_sorted(&in_bin, 0.99),
                })
            }
        })
        .collect()
}

/// One row of the fine-grained timeseries. Gap quantiles are in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MicroBin {
    pub start_s: f64,
    pub packets: u64,
    pub gaps_us: BinGaps,
}

/// One row of the coarse timeseries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoarseBin {
    pub start_s: f64,
    pub packets: u64,
    pub retransmissions: u64,
    pub out_of_order: u64,
    pub lost_segments: u64,
}

pub fn micro_timeseries(timestamps: &[f64], width: BinWidth) -> Vec<MicroBin> {
    let bins = assign_bins(timestamps, width);
    let counts = count_bins(&bins, &[]);
    let gaps_us: Vec<f64> = inter_packet_gaps(timestamps)
        .into_iter()
        .map(|g| g * 1e6)
        .collect();
    let gaps = gap_quantiles_per_bin(&gaps_us, &bins);

    counts
        .packets
        .into_iter()
        .zip(gaps)
        .enumerate()
        .map(|(k, (packets, gaps_us))| MicroBin {
            start_s: bins.bin_start(k),
            packets,
            gaps_us,
        })
        .collect()
}

/// Coarse timeseries: packets and classification events per bin.
pub fn coarse_timeseries(
    timestamps: &[f64],
    classification: &Classification,
    width: BinWidth,
) -> Vec<CoarseBin> {
    let bins = assign_bins(timestamps, width);
    let counts = count_bins(
        &bins,
        &[
            classification.is_retransmission.as_slice(),
            classification.is_out_of_order.as_slice(),
            classification.is_lost_segment.as_slice(),
        ],
    );

    (0..bins.n_bins)
        .map(|k| CoarseBin {
            start_s: bins.bin_start(k),
            packets: counts.packets[k],
            retransmissions: counts.events[0][k],
            out_of_order: counts.events[1][k],
            lost_segments: counts.events[2][k],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width(secs: f64) -> BinWidth {
        BinWidth::new(Duration::from_secs_f64(secs)).unwrap()
    }

    #[test]
    fn zero_width_is_rejected() {
        assert!(BinWidth::from_micros(0).is_none());
        assert!(BinWidth::from_millis(0).is_none());
        assert_eq!(BinWidth::from_micros(50).unwrap().as_secs_f64(), 50e-6);
    }

    #[test]
    fn fixed_bin_counting() {
        let t = [0.0, 0.01, 0.02, 0.05];
        let bins = assign_bins(&t, width(0.02));
        assert_eq!(bins.index, vec![0, 0, 1, 2]);
        assert_eq!(bins.n_bins, 3);

        let counts = count_bins(&bins, &[]);
        assert_eq!(counts.packets, vec![2, 1, 1]);
        assert!((bins.bin_start(2) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn empty_bins_are_reported_as_zero() {
        let t = [10.0, 10.001, 10.0105];
        let bins = assign_bins(&t, width(0.002));
        let counts = count_bins(&bins, &[]);
        assert_eq!(counts.packets, vec![2, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn event_flags_are_summed_per_bin() {
        let t = [0.0, 0.5, 1.2, 1.4, 3.1];
        let retrans = [false, true, true, true, false];
        let ooo = [false, false, false, true, true];
        let bins = assign_bins(&t, width(1.0));
        let counts = count_bins(&bins, &[&retrans[..], &ooo[..]]);
        assert_eq!(counts.packets, vec![2, 2, 0, 1]);
        assert_eq!(counts.events[0], vec![1, 2, 0, 0]);
        assert_eq!(counts.events[1], vec![0, 1, 0, 1]);
    }

    #[test]
    fn empty_input_produces_no_bins() {
        let bins = assign_bins(&[], width(0.001));
        assert_eq!(bins.n_bins, 0);
        assert!(count_bins(&bins, &[]).packets.is_empty());
        assert!(micro_timeseries(&[], width(0.001)).is_empty());
        assert_eq!(
            packets_per_bin_distribution(&[], width(0.001)),
            Err(StatsError::EmptySample)
        );
    }

    #[test]
    fn gaps_belong_to_the_later_packet() {
        // Packets at 0, 1, 2.5, 2.6, 5.5 with 1s bins:
        // bin 0: first packet only -> no data
        // bin 1: gap 1.0
        // bin 2: gaps 1.5 and 0.1
        // bins 3, 4: empty
        // bin 5: gap 2.9
        let t = [0.0, 1.0, 2.5, 2.6, 5.5];
        let bins = assign_bins(&t, width(1.0));
        let gaps = inter_packet_gaps(&t);
        let per_bin = gap_quantiles_per_bin(&gaps, &bins);

        assert_eq!(per_bin.len(), 6);
        assert_eq!(per_bin[0], BinGaps::NoData);
        assert_eq!(
            per_bin[1],
            BinGaps::Measured(GapQuantiles { p1: 1.0, p50: 1.0, p99: 1.0 })
        );
        let q = per_bin[2].measured().unwrap();
        assert!((q.p50 - 0.8).abs() < 1e-9);
        assert!(q.p1 < q.p50 && q.p50 < q.p99);
        assert_eq!(per_bin[3], BinGaps::NoData);
        assert_eq!(per_bin[4], BinGaps::NoData);
        assert!((per_bin[5].measured().unwrap().p99 - 2.9).abs() < 1e-9);
    }

    #[test]
    fn micro_timeseries_reports_microseconds() {
        let t = [1.0, 1.000010, 1.000030, 1.000210];
        let rows = micro_timeseries(&t, width(50e-6));
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].packets, 3);
        let q = rows[0].gaps_us.measured().unwrap();
        assert!((q.p50 - 15.0).abs() < 1e-6);
        assert_eq!(rows[1].gaps_us, BinGaps::NoData);
        assert_eq!(rows[4].packets, 1);
        assert!((rows[4].gaps_us.measured().unwrap().p1 - 180.0).abs() < 1e-6);
        assert!((rows[4].start_s - 1.0002).abs() < 1e-9);
    }

    #[test]
    fn packets_per_bin_distribution_includes_empty_bins() {
        let t = [0.0, 0.0, 0.0, 3.5];
        let d = packets_per_bin_distribution(&t, width(1.0)).unwrap();
        assert_eq!(d.count, 4);
        assert_eq!(d.max, 3.0);
        assert_eq!(d.min, 0.0);
        assert!((d.mean - 1.0).abs() < 1e-12);
        // Sorted counts are [0, 0, 1, 3].
        assert!((d.p50 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn coarse_timeseries_counts_events() {
        let t = [0.0, 0.0004, 0.0011, 0.0012];
        let classification = Classification {
            retransmissions: 1,
            out_of_order: 1,
            lost_segments: 1,
            is_retransmission: vec![false, false, true, false],
            is_out_of_order: vec![false, false, true, false],
            is_lost_segment: vec![false, true, false, false],
        };
        let rows = coarse_timeseries(&t, &classification, width(0.001));
        assert_eq!(rows.len(), 2);
        assert!((rows[1].start_s - 0.001).abs() < 1e-12);
        assert_eq!(rows[0].packets, 2);
        assert_eq!(rows[0].lost_segments, 1);
        assert_eq!(rows[1].retransmissions, 1);
        assert_eq!(rows[1].out_of_order, 1);
    }
}
