//! CSV reader for tshark field exports.

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::flow::FlowBasics;
use crate::packet::PacketRecord;

/// Errors from reading a packet export.
#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    Csv(csv::Error),
    /// A row parsed but its values are unusable.
    InvalidRow { line: u64, reason: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "packet file io error: {}", e),
            IngestError::Csv(e) => write!(f, "packet file parse error: {}", e),
            IngestError::InvalidRow { line, reason } => {
                write!(f, "invalid packet row at line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        IngestError::Csv(e)
    }
}

/// Columns we read; anything else in the export is ignored.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "frame.time_epoch")]
    time_epoch: f64,
    #[serde(rename = "frame.len")]
    frame_len: u32,
    #[serde(rename = "tcp.stream")]
    stream: Option<u64>,
    #[serde(rename = "tcp.seq")]
    seq: Option<u64>,
    #[serde(rename = "tcp.len")]
    tcp_len: Option<u32>,
}

/// Frame count, byte sum and time span over every row of an export,
/// TCP or not.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureTotals {
    pub frames: u64,
    pub bytes: u64,
    pub first_ts: Option<f64>,
    pub last_ts: Option<f64>,
}

impl CaptureTotals {
    pub fn observe(&mut self, timestamp: f64, frame_len: u32) {
        self.frames += 1;
        self.bytes += u64::from(frame_len);
        self.first_ts = Some(self.first_ts.map_or(timestamp, |t| t.min(timestamp)));
        self.last_ts = Some(self.last_ts.map_or(timestamp, |t| t.max(timestamp)));
    }

    pub fn duration_s(&self) -> f64 {
        match (self.first_ts, self.last_ts) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Capture-wide summary for the report.
    pub fn summary(&self) -> FlowBasics {
        FlowBasics::from_span(self.duration_s(), self.frames, self.bytes)
    }
}

/// Every TCP row of a capture, in file order.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub packets: Vec<PacketRecord>,
    /// Rows without TCP stream/sequence information.
    pub skipped_rows: u64,
    pub totals: CaptureTotals,
}

pub fn read_packets_file(path: &Path) -> Result<Capture, IngestError> {
    let file = File::open(path)?;
    read_packets(BufReader::new(file))
}

pub fn read_packets<R: Read>(input: R) -> Result<Capture, IngestError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let headers = reader.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut capture = Capture::default();
    while reader.read_record(&mut record)? {
        let row: Row = record.deserialize(Some(&headers))?;
        if !row.time_epoch.is_finite() {
            return Err(IngestError::InvalidRow {
                line: record.position().map_or(0, |p| p.line()),
                reason: format!("timestamp {} is not finite", row.time_epoch),
            });
        }
        capture.totals.observe(row.time_epoch, row.frame_len);

        let (Some(flow_id), Some(seq)) = (row.stream, row.seq) else {
            capture.skipped_rows += 1;
            tracing::trace!("skipping row without tcp stream/seq");
            continue;
        };

        capture.packets.push(PacketRecord {
            timestamp: row.time_epoch,
            flow_id,
            seq,
            payload_len: row.tcp_len.unwrap_or(0),
            frame_len: row.frame_len,
        });
    }

    if capture.skipped_rows > 0 {
        tracing::debug!(skipped = capture.skipped_rows, "rows without tcp fields");
    }
    tracing::info!(packets = capture.packets.len(), "capture loaded");
    Ok(capture)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
frame.time_epoch,frame.len,tcp.stream,tcp.seq,tcp.len,tcp.analysis.retransmission
1700000000.000100,1514,0,1,1448,
1700000000.000112,66,0,1449,0,
1700000000.000130,1514,1,1,1448,1
1700000000.000150,60,,,,
";

    #[test]
    fn reads_tcp_rows_and_skips_others() {
        let capture = read_packets(EXPORT.as_bytes()).unwrap();
        assert_eq!(capture.packets.len(), 3);
        assert_eq!(capture.skipped_rows, 1);

        let first = capture.packets[0];
        assert_eq!(first.flow_id, 0);
        assert_eq!(first.seq, 1);
        assert_eq!(first.payload_len, 1448);
        assert_eq!(first.frame_len, 1514);
        assert!((first.timestamp - 1_700_000_000.0001).abs() < 1e-6);

        assert_eq!(capture.packets[1].payload_len, 0);
        assert_eq!(capture.packets[2].flow_id, 1);
    }

    #[test]
    fn totals_count_every_row() {
        let capture = read_packets(EXPORT.as_bytes()).unwrap();
        let totals = capture.totals;
        assert_eq!(totals.frames, 4);
        assert_eq!(totals.bytes, 1514 + 66 + 1514 + 60);
        assert!((totals.duration_s() - 50e-6).abs() < 1e-6);

        let summary = totals.summary();
        assert_eq!(summary.packets, 4);
        assert_eq!(summary.bytes, 3154);
        assert!(summary.pps > 0.0);
    }

    #[test]
    fn empty_export_has_zero_totals() {
        let export = "frame.time_epoch,frame.len,tcp.stream,tcp.seq,tcp.len\n";
        let summary = read_packets(export.as_bytes()).unwrap().totals.summary();
        assert_eq!(summary.packets, 0);
        assert_eq!(summary.duration_s, 0.0);
        assert_eq!(summary.pps, 0.0);
    }

    #[test]
    fn missing_column_is_an_error() {
        let export = "frame.time_epoch,tcp.stream,tcp.seq,tcp.len\n1.0,0,1,10\n";
        assert!(matches!(
            read_packets(export.as_bytes()),
            Err(IngestError::Csv(_))
        ));
    }

    #[test]
    fn non_finite_timestamp_is_rejected() {
        let export = "frame.time_epoch,frame.len,tcp.stream,tcp.seq,tcp.len\nNaN,60,0,1,10\n";
        assert!(matches!(
            read_packets(export.as_bytes()),
            Err(IngestError::InvalidRow { .. })
        ));
    }
}
