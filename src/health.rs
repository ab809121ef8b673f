//! Capture health checks.
//!
//! Two sources: the capture tool's end-of-run log (packets passed / failed
//! the filter) and NIC counter dumps (`ethtool -S`) taken before and after
//! the run.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum HealthError {
    Io(std::io::Error),
    Pattern(regex::Error),
}

impl fmt::Display for HealthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthError::Io(err) => write!(f, "health file io error: {}", err),
            HealthError::Pattern(err) => write!(f, "health pattern error: {}", err),
        }
    }
}

impl std::error::Error for HealthError {}

impl From<std::io::Error> for HealthError {
    fn from(e: std::io::Error) -> Self {
        HealthError::Io(e)
    }
}

impl From<regex::Error> for HealthError {
    fn from(e: regex::Error) -> Self {
        HealthError::Pattern(e)
    }
}

/// Counters from the capture tool's log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureLogStats {
    pub packets_captured: Option<u64>,
    pub packets_dropped: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub capture_log: Option<CaptureLogStats>,
    /// NIC counters that changed during the run, by name.
    pub nic_counter_deltas: Option<BTreeMap<String, i64>>,
}

/// Compiled line patterns.
#[derive(Debug, Clone)]
pub struct HealthParser {
    passed: Regex,
    failed: Regex,
    counter: Regex,
}

impl HealthParser {
    pub fn new() -> Result<Self, HealthError> {
        Ok(HealthParser {
            passed: Regex::new(r"(?i)^\s*(\d+)\s+packets passed filter")?,
            failed: Regex::new(r"(?i)^\s*(\d+)\s+packets failed filter")?,
            counter: Regex::new(r"^\s*([A-Za-z0-9._]+):\s*([0-9]+)\s*$")?,
        })
    }

    pub fn parse_capture_log(&self, text: &str) -> CaptureLogStats {
        let mut stats = CaptureLogStats::default();
        for line in text.lines() {
            if let Some(value) = capture_u64(&self.passed, line) {
                stats.packets_captured = Some(value);
            } else if let Some(value) = capture_u64(&self.failed, line) {
                stats.packets_dropped = Some(value);
            }
        }
        stats
    }

    pub fn parse_counters(&self, text: &str) -> BTreeMap<String, u64> {
        let mut counters = BTreeMap::new();
        for line in text.lines() {
            if let Some(caps) = self.counter.captures(line) {
                if let Ok(value) = caps[2].parse::<u64>() {
                    counters.insert(caps[1].to_string(), value);
                }
            }
        }
        counters
    }
}

fn capture_u64(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line).and_then(|caps| caps[1].parse().ok())
}

/// Non-zero `after - before` deltas for counters present in both dumps.
pub fn counter_deltas(
    before: &BTreeMap<String, u64>,
    after: &BTreeMap<String, u64>,
) -> BTreeMap<String, i64> {
    before
        .iter()
        .filter_map(|(name, &b)| {
            let a = *after.get(name)?;
            let delta = a as i64 - b as i64;
            (delta != 0).then(|| (name.clone(), delta))
        })
        .collect()
}

/// Where to find the health inputs. Every path is optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthInputs<'a> {
    pub capture_log: Option<&'a Path>,
    pub counters_before: Option<&'a Path>,
    pub counters_after: Option<&'a Path>,
}

/// Build a report from whichever inputs are configured.
///
/// Unreadable files are logged and leave their section empty.
pub fn check(inputs: HealthInputs<'_>) -> Result<HealthReport, HealthError> {
    let parser = HealthParser::new()?;
    let mut report = HealthReport::default();

    if let Some(path) = inputs.capture_log {
        match std::fs::read_to_string(path) {
            Ok(text) => report.capture_log = Some(parser.parse_capture_log(&text)),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "capture log unreadable"),
        }
    }

    if let (Some(before), Some(after)) = (inputs.counters_before, inputs.counters_after) {
        let before = read_counters(&parser, before);
        let after = read_counters(&parser, after);
        match (before, after) {
            (Some(b), Some(a)) if !b.is_empty() && !a.is_empty() => {
                report.nic_counter_deltas = Some(counter_deltas(&b, &a));
            }
            _ => tracing::warn!("nic counter dumps missing or empty, skipping counter deltas"),
        }
    }

    Ok(report)
}

fn read_counters(parser: &HealthParser, path: &Path) -> Option<BTreeMap<String, u64>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(parser.parse_counters(&text)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "counter dump unreadable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_capture_log() {
        let parser = HealthParser::new().unwrap();
        let log = "\
Running! Hang up with ^C!

   1048576  packets incoming (0 unread on exit)
   1048570  packets passed filter
         6  packets failed filter (out of space)
";
        let stats = parser.parse_capture_log(log);
        assert_eq!(stats.packets_captured, Some(1_048_570));
        assert_eq!(stats.packets_dropped, Some(6));
    }

    #[test]
    fn capture_log_without_counters() {
        let parser = HealthParser::new().unwrap();
        assert_eq!(
            parser.parse_capture_log("nothing to see\n"),
            CaptureLogStats::default()
        );
    }

    #[test]
    fn counter_deltas_keep_changes_only() {
        let parser = HealthParser::new().unwrap();
        let before = parser.parse_counters(
            "NIC statistics:\n     rx_packets: 100\n     tx_packets: 50\n     rx_dropped: 0\n     rx_missed_errors: 7\n",
        );
        let after = parser.parse_counters(
            "NIC statistics:\n     rx_packets: 1100\n     tx_packets: 50\n     rx_dropped: 3\n",
        );
        assert_eq!(before.len(), 4);

        let deltas = counter_deltas(&before, &after);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas["rx_packets"], 1000);
        assert_eq!(deltas["rx_dropped"], 3);
        assert!(!deltas.contains_key("tx_packets"));
        assert!(!deltas.contains_key("rx_missed_errors"));
    }

    #[test]
    fn unconfigured_inputs_give_empty_report() {
        let report = check(HealthInputs::default()).unwrap();
        assert_eq!(report, HealthReport::default());
    }

    #[test]
    fn missing_files_are_not_fatal() {
        let report = check(HealthInputs {
            capture_log: Some(Path::new("/nonexistent/capture.log")),
            counters_before: Some(Path::new("/nonexistent/before")),
            counters_after: Some(Path::new("/nonexistent/after")),
        })
        .unwrap();
        assert!(report.capture_log.is_none());
        assert!(report.nic_counter_deltas.is_none());
    }
}
