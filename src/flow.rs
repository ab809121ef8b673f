use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::analysis::classify::{classify, Classification};
use crate::analysis::stats::{Distribution, StatsError};
use crate::analysis::window::{
    coarse_timeseries, inter_packet_gaps, micro_timeseries, packets_per_bin_distribution,
    CoarseBin, MicroBin,
};
use crate::config::{AnalysisConfig, BinWidths};
use crate::health::HealthReport;
use crate::packet::{FlowId, FlowPackets, PacketRecord};

/// Volume and rate figures over a span of packets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowBasics {
    pub duration_s: f64,
    pub packets: u64,
    pub bytes: u64,
    pub throughput_mbps: f64,
    pub pps: f64,
}

impl FlowBasics {
    /// Rates are zero when the span has no duration.
    pub fn from_packets(packets: &[PacketRecord]) -> Self {
        let (first, last) = packets.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
            (acc.0.min(p.timestamp), acc.1.max(p.timestamp))
        });
        let duration_s = if packets.is_empty() { 0.0 } else { (last - first).max(0.0) };
        let bytes: u64 = packets.iter().map(|p| u64::from(p.frame_len)).sum();
        FlowBasics::from_span(duration_s, packets.len() as u64, bytes)
    }

    /// Same figures from totals gathered elsewhere. Rates are zero when
    /// `duration_s` is not positive.
    pub fn from_span(duration_s: f64, packets: u64, bytes: u64) -> Self {
        let duration_s = duration_s.max(0.0);
        let (throughput_mbps, pps) = if duration_s > 0.0 {
            (
                bytes as f64 * 8.0 / duration_s / 1_000_000.0,
                packets as f64 / duration_s,
            )
        } else {
            (0.0, 0.0)
        };

        FlowBasics {
            duration_s,
            packets,
            bytes,
            throughput_mbps,
            pps,
        }
    }
}

/// Everything computed for one flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowMetrics {
    pub flow_id: FlowId,
    #[serde(flatten)]
    pub basics: FlowBasics,
    pub retransmissions: u64,
    pub out_of_order: u64,
    pub lost_segments: u64,
    /// Inter-packet gaps in microseconds; `None` for single-packet flows.
    pub ipg_us: Option<Distribution>,
    /// Packets per `ppb` bin, empty bins included.
    pub packets_per_bin: Distribution,
    pub micro: Vec<MicroBin>,
    pub coarse: Vec<CoarseBin>,
    /// Per-packet flags, index-aligned with the flow's packets. Omitted from
    /// JSON once cleared by [`Report::without_packet_flags`].
    #[serde(rename = "packet_flags", skip_serializing_if = "Classification::is_empty")]
    pub classification: Classification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedFlow {
    pub flow_id: FlowId,
    pub packets: u64,
}

#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Analysed(Box<FlowMetrics>),
    Skipped(SkippedFlow),
}

impl FlowOutcome {
    pub fn flow_id(&self) -> FlowId {
        match self {
            FlowOutcome::Analysed(m) => m.flow_id,
            FlowOutcome::Skipped(s) => s.flow_id,
        }
    }
}

/// Turns one flow's packets into [`FlowMetrics`]. Holds no per-flow state,
/// so a single analyzer can be shared by reference across workers.
#[derive(Debug, Clone, Copy)]
pub struct FlowAnalyzer {
    widths: BinWidths,
    min_packets: usize,
}

impl FlowAnalyzer {
    pub fn new(widths: BinWidths, min_packets: usize) -> Self {
        FlowAnalyzer {
            widths,
            min_packets,
        }
    }

    pub fn analyze(&self, flow: &FlowPackets) -> Result<FlowOutcome, StatsError> {
        let packets = &flow.packets;
        if packets.is_empty() || packets.len() <= self.min_packets {
            tracing::info!(
                flow = flow.flow_id,
                packets = packets.len(),
                "skipping short flow"
            );
            return Ok(FlowOutcome::Skipped(SkippedFlow {
                flow_id: flow.flow_id,
                packets: packets.len() as u64,
            }));
        }

        tracing::debug!(flow = flow.flow_id, packets = packets.len(), "analysing flow");

        let timestamps = flow.timestamps();
        let basics = FlowBasics::from_packets(packets);
        let classification = classify(packets);

        let gaps_us: Vec<f64> = inter_packet_gaps(&timestamps)
            .into_iter()
            .map(|g| g * 1e6)
            .collect();
        let ipg_us = if gaps_us.is_empty() {
            None
        } else {
            Some(Distribution::from_samples(&gaps_us)?)
        };

        let packets_per_bin = packets_per_bin_distribution(&timestamps, self.widths.ppb)?;
        let micro = micro_timeseries(&timestamps, self.widths.micro);
        let coarse = coarse_timeseries(&timestamps, &classification, self.widths.coarse);

        Ok(FlowOutcome::Analysed(Box::new(FlowMetrics {
            flow_id: flow.flow_id,
            basics,
            retransmissions: classification.retransmissions,
            out_of_order: classification.out_of_order,
            lost_segments: classification.lost_segments,
            ipg_us,
            packets_per_bin,
            micro,
            coarse,
            classification,
        })))
    }
}

/// Result of one run, flows ordered by id.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub capture: FlowBasics,
    pub health: Option<HealthReport>,
    pub flows: Vec<FlowMetrics>,
    pub skipped: Vec<SkippedFlow>,
}

impl Report {
    pub fn new(
        capture: FlowBasics,
        health: Option<HealthReport>,
        outcomes: Vec<FlowOutcome>,
    ) -> Self {
        let mut flows = Vec::new();
        let mut skipped = Vec::new();
        for outcome in outcomes {
            match outcome {
                FlowOutcome::Analysed(m) => flows.push(*m),
                FlowOutcome::Skipped(s) => skipped.push(s),
            }
        }
        flows.sort_by_key(|m| m.flow_id);
        skipped.sort_by_key(|s| s.flow_id);
        Report {
            capture,
            health,
            flows,
            skipped,
        }
    }

    /// Drop the per-packet flags, keeping the per-flow counts.
    pub fn without_packet_flags(mut self) -> Self {
        for flow in &mut self.flows {
            flow.classification = Classification::default();
        }
        self
    }
}

pub fn write_report_json(path: &Path, report: &Report) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PerFlowRow {
    flow: FlowId,
    duration_s: f64,
    packets: u64,
    bytes: u64,
    throughput_mbps: f64,
    pps: f64,
    retrans_packets: u64,
    ooo_packets: u64,
    lost_packets: u64,
    ipg_count: Option<usize>,
    ipg_mean_us: Option<f64>,
    ipg_median_us: Option<f64>,
    ipg_p90_us: Option<f64>,
    ipg_p99_us: Option<f64>,
    ipg_p999_us: Option<f64>,
    ipg_max_us: Option<f64>,
    ipg_std_us: Option<f64>,
    ipg_min_us: Option<f64>,
    ipg_p01_us: Option<f64>,
    ipg_p1_us: Option<f64>,
    ipg_p10_us: Option<f64>,
    ppb_count: usize,
    ppb_mean: f64,
    ppb_median: f64,
    ppb_p90: f64,
    ppb_p99: f64,
    ppb_p999: f64,
    ppb_max: f64,
    ppb_std: f64,
    ppb_min: f64,
    ppb_p01: f64,
    ppb_p1: f64,
    ppb_p10: f64,
}

impl PerFlowRow {
    fn from_metrics(m: &FlowMetrics) -> Self {
        let ipg = m.ipg_us.as_ref();
        let ppb = &m.packets_per_bin;
        PerFlowRow {
            flow: m.flow_id,
            duration_s: m.basics.duration_s,
            packets: m.basics.packets,
            bytes: m.basics.bytes,
            throughput_mbps: m.basics.throughput_mbps,
            pps: m.basics.pps,
            retrans_packets: m.retransmissions,
            ooo_packets: m.out_of_order,
            lost_packets: m.lost_segments,
            ipg_count: ipg.map(|d| d.count),
            ipg_mean_us: ipg.map(|d| d.mean),
            ipg_median_us: ipg.map(|d| d.p50),
            ipg_p90_us: ipg.map(|d| d.p90),
            ipg_p99_us: ipg.map(|d| d.p99),
            ipg_p999_us: ipg.map(|d| d.p99_9),
            ipg_max_us: ipg.map(|d| d.max),
            ipg_std_us: ipg.map(|d| d.std),
            ipg_min_us: ipg.map(|d| d.min),
            ipg_p01_us: ipg.map(|d| d.p0_1),
            ipg_p1_us: ipg.map(|d| d.p1),
            ipg_p10_us: ipg.map(|d| d.p10),
            ppb_count: ppb.count,
            ppb_mean: ppb.mean,
            ppb_median: ppb.p50,
            ppb_p90: ppb.p90,
            ppb_p99: ppb.p99,
            ppb_p999: ppb.p99_9,
            ppb_max: ppb.max,
            ppb_std: ppb.std,
            ppb_min: ppb.min,
            ppb_p01: ppb.p0_1,
            ppb_p1: ppb.p1,
            ppb_p10: ppb.p10,
        }
    }
}

pub fn write_flow_csv(path: &Path, flows: &[FlowMetrics]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for flow in flows {
        writer.serialize(PerFlowRow::from_metrics(flow))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MicroRow {
    start_s: f64,
    bin_packets: u64,
    ipg_p01_us: Option<f64>,
    ipg_p50_us: Option<f64>,
    ipg_p99_us: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CoarseRow {
    start_s: f64,
    bin_pkts: u64,
    retrans_pkts: u64,
    ooo_pkts: u64,
    lost_pkts: u64,
}

/// Bins without gaps are written as empty cells.
pub fn write_micro_csv(path: &Path, rows: &[MicroBin]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        let q = row.gaps_us.measured();
        writer.serialize(MicroRow {
            start_s: row.start_s,
            bin_packets: row.packets,
            ipg_p01_us: q.map(|q| q.p1),
            ipg_p50_us: q.map(|q| q.p50),
            ipg_p99_us: q.map(|q| q.p99),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_coarse_csv(path: &Path, rows: &[CoarseBin]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(CoarseRow {
            start_s: row.start_s,
            bin_pkts: row.packets,
            retrans_pkts: row.retransmissions,
            ooo_pkts: row.out_of_order,
            lost_pkts: row.lost_segments,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `cli.txt`, `per_flow.csv` and (optionally) the per-flow timeseries
/// files into `dir`, creating it if needed.
pub fn write_metrics_dir(
    dir: &Path,
    report: &Report,
    cli_text: &str,
    analysis: &AnalysisConfig,
    timeseries: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join("cli.txt"), cli_text)?;
    write_flow_csv(&dir.join("per_flow.csv"), &report.flows)?;

    if timeseries {
        for flow in &report.flows {
            let micro = dir.join(format!(
                "flow_{}_micro_{}us.csv",
                flow.flow_id, analysis.micro_bin_us
            ));
            write_micro_csv(&micro, &flow.micro)?;
            let coarse = dir.join(format!(
                "flow_{}_events_{}ms.csv",
                flow.flow_id, analysis.coarse_bin_ms
            ));
            write_coarse_csv(&coarse, &flow.coarse)?;
        }
    }
    tracing::info!(dir = %dir.display(), flows = report.flows.len(), "metrics written");
    Ok(())
}
