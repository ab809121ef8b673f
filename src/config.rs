use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::analysis::window::BinWidth;

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.and_then(|path| {
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub analysis: AnalysisConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Config = toml::from_str(&raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.bin_widths().map(|_| ())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// tshark field export, one row per packet.
    pub packets_csv: PathBuf,
    #[serde(deserialize_with = "empty_path_none")]
    pub capture_log: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub ethtool_before: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub ethtool_after: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        InputConfig {
            packets_csv: PathBuf::from("./packets.csv"),
            capture_log: None,
            ethtool_before: None,
            ethtool_after: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of the fine-grained timeseries bins (packets + gap quantiles).
    pub micro_bin_us: u64,
    /// Width of the coarse timeseries bins (packets + events).
    pub coarse_bin_ms: u64,
    /// Bin width behind the packets-per-bin distribution.
    pub ppb_bin_us: u64,
    /// Flows with this many payload packets or fewer are not analysed.
    pub min_packets: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            micro_bin_us: 50,
            coarse_bin_ms: 1,
            ppb_bin_us: 10,
            min_packets: 100,
        }
    }
}

/// Validated bin widths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinWidths {
    pub micro: BinWidth,
    pub coarse: BinWidth,
    pub ppb: BinWidth,
}

impl AnalysisConfig {
    pub fn bin_widths(&self) -> Result<BinWidths, ConfigError> {
        let micro = BinWidth::from_micros(self.micro_bin_us)
            .ok_or_else(|| ConfigError::Invalid("analysis.micro_bin_us must be positive".into()))?;
        let coarse = BinWidth::from_millis(self.coarse_bin_ms)
            .ok_or_else(|| ConfigError::Invalid("analysis.coarse_bin_ms must be positive".into()))?;
        let ppb = BinWidth::from_micros(self.ppb_bin_us)
            .ok_or_else(|| ConfigError::Invalid("analysis.ppb_bin_us must be positive".into()))?;
        Ok(BinWidths { micro, coarse, ppb })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads (0 = auto-detect from CPU count).
    pub num_workers: usize,
    /// Capacity of each dispatcher → worker channel.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            num_workers: 0,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for cli.txt, per_flow.csv and timeseries files.
    #[serde(deserialize_with = "empty_path_none")]
    pub metrics_dir: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_json: Option<PathBuf>,
    /// Write per-flow timeseries CSVs into `metrics_dir`.
    pub timeseries: bool,
    /// Keep the per-packet flags in the JSON export.
    pub packet_flags: bool,
    pub quiet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            metrics_dir: Some(PathBuf::from("metrics")),
            export_json: None,
            timeseries: true,
            packet_flags: false,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_bins() {
        let config = Config::default();
        let widths = config.analysis.bin_widths().unwrap();
        assert!((widths.micro.as_secs_f64() - 50e-6).abs() < 1e-15);
        assert!((widths.coarse.as_secs_f64() - 1e-3).abs() < 1e-15);
        assert!((widths.ppb.as_secs_f64() - 10e-6).abs() < 1e-15);
        assert_eq!(config.analysis.min_packets, 100);
        assert_eq!(config.output.metrics_dir, Some(PathBuf::from("metrics")));
        assert!(!config.output.packet_flags);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            micro_bin_us = 100

            [output]
            metrics_dir = ""
            export_json = "report.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.micro_bin_us, 100);
        assert_eq!(config.analysis.coarse_bin_ms, 1);
        assert_eq!(config.output.metrics_dir, None);
        assert_eq!(config.output.export_json, Some(PathBuf::from("report.json")));
        assert_eq!(config.input.packets_csv, PathBuf::from("./packets.csv"));
    }

    #[test]
    fn zero_bin_width_is_invalid() {
        let mut config = Config::default();
        config.analysis.coarse_bin_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
