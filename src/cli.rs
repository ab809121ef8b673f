use clap::Parser;
use std::path::PathBuf;

/// tcpscope: per-flow TCP retransmission, reordering and pacing metrics
/// from a tshark packet export
#[derive(Parser, Debug)]
#[command(name = "tcpscope", version, about)]
pub struct Cli {
    /// TOML config file. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Packet export (tshark -T fields, CSV with header)
    #[arg(short, long)]
    pub packets: Option<PathBuf>,

    /// Capture tool log with "packets passed/failed filter" lines
    #[arg(long)]
    pub capture_log: Option<PathBuf>,

    /// `ethtool -S` dump taken before the capture
    #[arg(long)]
    pub ethtool_before: Option<PathBuf>,

    /// `ethtool -S` dump taken after the capture
    #[arg(long)]
    pub ethtool_after: Option<PathBuf>,

    /// Output directory for cli.txt, per_flow.csv and timeseries (empty disables)
    #[arg(short, long)]
    pub metrics_dir: Option<PathBuf>,

    /// Fine timeseries bin width in microseconds
    #[arg(long)]
    pub micro_bin_us: Option<u64>,

    /// Event timeseries bin width in milliseconds
    #[arg(long)]
    pub coarse_bin_ms: Option<u64>,

    /// Bin width for the packets-per-bin distribution, in microseconds
    #[arg(long)]
    pub ppb_bin_us: Option<u64>,

    /// Skip flows with this many payload packets or fewer
    #[arg(long)]
    pub min_packets: Option<usize>,

    /// Worker threads (0 = auto)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Write the full report as JSON to this path
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Do not write per-flow timeseries CSVs
    #[arg(long)]
    pub no_timeseries: bool,

    /// Include per-packet retransmission/order/loss flags in the JSON export
    #[arg(long)]
    pub packet_flags: bool,

    /// Suppress the tables on stdout
    #[arg(short, long)]
    pub quiet: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
