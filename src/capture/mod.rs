//! Capture ingestion.
//!
//! Reads the per-packet field export produced by tshark
//! (`-T fields -E header=y -E separator=,`) into typed packet records.

pub mod reader;

pub use reader::{read_packets, read_packets_file, Capture, CaptureTotals, IngestError};
