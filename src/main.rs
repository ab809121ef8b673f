mod cli;

use clap::Parser;
use std::time::Instant;

use tcpscope::capture;
use tcpscope::config::{self, Config};
use tcpscope::display;
use tcpscope::flow::{self, FlowAnalyzer, Report};
use tcpscope::health::{self, HealthInputs};
use tcpscope::packet;
use tcpscope::pipeline;

fn main() {
    let args = cli::Cli::parse();

    // Initialize tracing/logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(e) = run_analysis(&config) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run_analysis(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let widths = config.analysis.bin_widths()?;

    let capture = capture::read_packets_file(&config.input.packets_csv)?;
    let health = health::check(HealthInputs {
        capture_log: config.input.capture_log.as_deref(),
        counters_before: config.input.ethtool_before.as_deref(),
        counters_after: config.input.ethtool_after.as_deref(),
    })?;

    let summary = capture.totals.summary();
    let flows = packet::group_flows(&capture.packets);
    tracing::info!(flows = flows.len(), "flows grouped");

    let analyzer = FlowAnalyzer::new(widths, config.analysis.min_packets);
    let outcomes = pipeline::analyze_flows(flows, analyzer, &config.pipeline)?;
    let report = Report::new(summary, Some(health), outcomes);

    let text = display::render_report(&report, config.analysis.ppb_bin_us);
    if !config.output.quiet {
        print!("{}", text);
    }

    if let Some(dir) = &config.output.metrics_dir {
        flow::write_metrics_dir(dir, &report, &text, &config.analysis, config.output.timeseries)?;
        if !config.output.quiet {
            println!("  Metrics written to: {}", dir.display());
        }
    }
    let (flows, skipped) = (report.flows.len(), report.skipped.len());
    if let Some(path) = &config.output.export_json {
        let report = if config.output.packet_flags {
            report
        } else {
            report.without_packet_flags()
        };
        flow::write_report_json(path, &report)?;
        if !config.output.quiet {
            println!("  Report export (JSON): {}", path.display());
        }
    }

    tracing::info!(
        flows,
        skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analysis finished"
    );
    Ok(())
}

fn load_config(args: &cli::Cli) -> Result<Config, config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let input = &mut config.input;
    if let Some(value) = &args.packets {
        input.packets_csv = value.clone();
    }
    if let Some(value) = &args.capture_log {
        input.capture_log = non_empty(value);
    }
    if let Some(value) = &args.ethtool_before {
        input.ethtool_before = non_empty(value);
    }
    if let Some(value) = &args.ethtool_after {
        input.ethtool_after = non_empty(value);
    }

    let analysis = &mut config.analysis;
    if let Some(value) = args.micro_bin_us {
        analysis.micro_bin_us = value;
    }
    if let Some(value) = args.coarse_bin_ms {
        analysis.coarse_bin_ms = value;
    }
    if let Some(value) = args.ppb_bin_us {
        analysis.ppb_bin_us = value;
    }
    if let Some(value) = args.min_packets {
        analysis.min_packets = value;
    }

    if let Some(value) = args.workers {
        config.pipeline.num_workers = value;
    }

    let output = &mut config.output;
    if let Some(value) = &args.metrics_dir {
        output.metrics_dir = non_empty(value);
    }
    if let Some(value) = &args.export_json {
        output.export_json = non_empty(value);
    }
    if args.no_timeseries {
        output.timeseries = false;
    }
    if args.packet_flags {
        output.packet_flags = true;
    }
    if args.quiet {
        output.quiet = true;
    }

    config.validate()?;
    Ok(config)
}

fn non_empty(path: &std::path::Path) -> Option<std::path::PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path.to_path_buf())
    }
}
