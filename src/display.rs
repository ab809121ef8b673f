//! Report rendering for the CLI.
//!
//! Formats the capture summary, health checks and per-flow metrics into
//! fixed-width text tables. Everything writes to an `io::Write` so the same
//! text goes to stdout and to `cli.txt`.

use std::io::{self, Write};

use crate::flow::{FlowBasics, FlowMetrics, Report};
use crate::health::HealthReport;

const WIDTH: usize = 100;

const FLOW_HEADERS: [&str; 15] = [
    "Flow", "Dur (s)", "Pkts", "Bytes", "Mb/s", "PPS", "Retr", "OOO", "Lost",
    "IPG p50 (µs)", "p90", "p99", "p99.9", "max", "jitter (µs)",
];
const FLOW_WIDTHS: [usize; 15] = [6, 10, 10, 14, 9, 10, 6, 6, 6, 14, 8, 8, 9, 10, 14];

const PPB_HEADERS: [&str; 13] = [
    "Flow", "Bins", "Mean", "Median", "p90", "p99", "p99.9", "Max", "Std", "Min", "p0.1", "p1",
    "p10",
];
const PPB_WIDTHS: [usize; 13] = [6, 10, 10, 10, 12, 12, 12, 12, 10, 10, 8, 8, 8];

/// Render every section of the report as one string.
pub fn render_report(report: &Report, ppb_bin_us: u64) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_report(&mut buf, report, ppb_bin_us);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn write_report<W: Write>(w: &mut W, report: &Report, ppb_bin_us: u64) -> io::Result<()> {
    if let Some(health) = &report.health {
        write_health(w, health)?;
    }
    write_capture_summary(w, &report.capture)?;
    write_flow_table(w, &report.flows)?;
    writeln!(w)?;
    write_ppb_table(w, &report.flows, ppb_bin_us)?;
    if !report.skipped.is_empty() {
        writeln!(w)?;
        for s in &report.skipped {
            writeln!(w, "skipped flow {} with only {} packets", s.flow_id, s.packets)?;
        }
    }
    Ok(())
}

pub fn write_health<W: Write>(w: &mut W, health: &HealthReport) -> io::Result<()> {
    if health.capture_log.is_none() && health.nic_counter_deltas.is_none() {
        return Ok(());
    }
    title(w, "HEALTH CHECKS")?;
    if let Some(log) = &health.capture_log {
        writeln!(
            w,
            "capture:  captured = {},  dropped = {}",
            opt_count(log.packets_captured),
            opt_count(log.packets_dropped)
        )?;
    }
    if let Some(deltas) = &health.nic_counter_deltas {
        writeln!(w)?;
        writeln!(w, "Changes in NIC counters:")?;
        if deltas.is_empty() {
            writeln!(w, "    (none)")?;
        }
        for (name, delta) in deltas {
            writeln!(w, "    {:36} {:+}", name, delta)?;
        }
    }
    line(w, WIDTH)
}

pub fn write_capture_summary<W: Write>(w: &mut W, capture: &FlowBasics) -> io::Result<()> {
    title(w, "METRICS FOR ALL FLOWS")?;
    writeln!(w, "Duration:            {} s", format_secs(capture.duration_s))?;
    writeln!(w, "Total bytes:         {}", format_bytes(capture.bytes))?;
    writeln!(w, "Total packets:       {}", format_int(capture.packets))?;
    writeln!(w, "Avg throughput:      {} Mb/s", format_float(capture.throughput_mbps, 2))?;
    writeln!(w, "Avg PPS:             {} pkts/s", format_float(capture.pps, 0))?;
    Ok(())
}

pub fn write_flow_table<W: Write>(w: &mut W, flows: &[FlowMetrics]) -> io::Result<()> {
    title(w, "PER-FLOW SUMMARY")?;
    writeln!(w, "{}", table_row(&FLOW_HEADERS, &FLOW_WIDTHS))?;
    line(w, table_width(&FLOW_WIDTHS))?;

    for m in flows {
        let ipg = |f: fn(&crate::analysis::Distribution) -> f64| {
            m.ipg_us.as_ref().map_or_else(|| "-".to_string(), |d| format_float(f(d), 2))
        };
        let values = [
            m.flow_id.to_string(),
            format_secs(m.basics.duration_s),
            format_int(m.basics.packets),
            format_bytes(m.basics.bytes),
            format_float(m.basics.throughput_mbps, 2),
            format_float(m.basics.pps, 0),
            format_int(m.retransmissions),
            format_int(m.out_of_order),
            format_int(m.lost_segments),
            ipg(|d| d.p50),
            ipg(|d| d.p90),
            ipg(|d| d.p99),
            ipg(|d| d.p99_9),
            ipg(|d| d.max),
            ipg(|d| d.std),
        ];
        writeln!(w, "{}", table_row(&values, &FLOW_WIDTHS))?;
    }
    line(w, table_width(&FLOW_WIDTHS))
}

pub fn write_ppb_table<W: Write>(w: &mut W, flows: &[FlowMetrics], ppb_bin_us: u64) -> io::Result<()> {
    title(
        w,
        &format!("PER-FLOW PACKETS-PER-BIN DISTRIBUTION (bin={}µs)", ppb_bin_us),
    )?;
    writeln!(w, "{}", table_row(&PPB_HEADERS, &PPB_WIDTHS))?;
    line(w, table_width(&PPB_WIDTHS))?;

    for m in flows {
        let d = &m.packets_per_bin;
        let mut values = vec![m.flow_id.to_string(), format_int(d.count as u64)];
        values.extend(
            [d.mean, d.p50, d.p90, d.p99, d.p99_9, d.max, d.std, d.min, d.p0_1, d.p1, d.p10]
                .iter()
                .map(|v| format_float(*v, 0)),
        );
        writeln!(w, "{}", table_row(&values, &PPB_WIDTHS))?;
    }
    line(w, table_width(&PPB_WIDTHS))
}

fn title<W: Write>(w: &mut W, text: &str) -> io::Result<()> {
    line(w, WIDTH)?;
    writeln!(w, "{:^width$}", text, width = WIDTH)?;
    line(w, WIDTH)
}

fn line<W: Write>(w: &mut W, width: usize) -> io::Result<()> {
    writeln!(w, "{}", "─".repeat(width))
}

fn table_row<S: AsRef<str>>(values: &[S], widths: &[usize]) -> String {
    values
        .iter()
        .zip(widths)
        .map(|(v, &width)| format!("{:>width$}", v.as_ref(), width = width))
        .collect::<Vec<_>>()
        .join(" ")
}

fn table_width(widths: &[usize]) -> usize {
    widths.iter().sum::<usize>() + widths.len().saturating_sub(1)
}

fn opt_count(value: Option<u64>) -> String {
    value.map_or_else(|| "n/a".to_string(), format_int)
}

/// Human-readable byte count with one decimal (B, KB, MB, GB).
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} GB", value * 1024.0)
}

/// Integer with `,` thousands separators.
pub fn format_int(n: u64) -> String {
    group_thousands(&n.to_string())
}

/// Fixed-decimal float with `,` thousands separators.
pub fn format_float(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };
    let mut out = String::new();
    // "-0" and "-0.00" are printed without the sign.
    if value < 0.0 && text.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

fn format_secs(s: f64) -> String {
    format!("{:.5}", s)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
