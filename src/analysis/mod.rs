//! Per-flow TCP analysis: sequence coverage, arrival order, and windowed
//! aggregation over packet timestamps.

pub mod classify;
pub mod coverage;
pub mod order;
pub mod stats;
pub mod window;

pub use classify::{classify, Classification, FlowClassifier, PacketFlags};
pub use coverage::CoverageSet;
pub use stats::{Distribution, StatsError};
pub use window::{BinGaps, BinWidth, CoarseBin, MicroBin};
