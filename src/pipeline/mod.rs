//! Sharded analysis pipeline.
//!
//! Flows are independent of each other, so per-flow analysis is split
//! across N worker threads ("shards"). Each worker owns its flows outright
//! and shares nothing with the others.
//!
//! Architecture:
//!
//! ```text
//! grouped flows (main thread)
//!   |
//!   |-- shard = hash(flow id) % N
//!   |
//!   +--[crossbeam channel]--→ Worker 0  (classify, bin, summarise)
//!   +--[crossbeam channel]--→ Worker 1
//!   ...
//!   +--[crossbeam channel]--→ Worker N-1
//!
//! Workers --[crossbeam channel]--→ Aggregator thread --→ outcomes by flow id
//! ```

pub mod aggregator;
pub mod router;
pub mod worker;

use crossbeam_channel::{bounded, Sender};
use std::fmt;
use std::thread;

use crate::analysis::stats::StatsError;
use crate::config::PipelineConfig;
use crate::flow::{FlowAnalyzer, FlowOutcome};
use crate::packet::{FlowId, FlowPackets};

pub use aggregator::AggregatorHandle;
pub use worker::WorkerEvent;

#[derive(Debug)]
pub enum PipelineError {
    Spawn(std::io::Error),
    /// A worker hung up before the dispatcher finished.
    WorkerGone { shard: usize },
    WorkerPanicked,
    Analysis { flow_id: FlowId, error: StatsError },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Spawn(err) => write!(f, "failed to spawn pipeline thread: {}", err),
            PipelineError::WorkerGone { shard } => write!(f, "worker {} exited early", shard),
            PipelineError::WorkerPanicked => write!(f, "a pipeline thread panicked"),
            PipelineError::Analysis { flow_id, error } => {
                write!(f, "analysis of flow {} failed: {}", flow_id, error)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Handle returned by [`spawn`]; the main thread dispatches flows through
/// it and then calls [`PipelineHandle::finish`].
pub struct PipelineHandle {
    senders: Vec<Sender<FlowPackets>>,
    aggregator: AggregatorHandle,
    worker_handles: Vec<thread::JoinHandle<()>>,
    aggregator_handle: Option<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Send one flow to its shard. Blocks while that shard's queue is full.
    pub fn dispatch(&self, flow: FlowPackets) -> Result<(), PipelineError> {
        let shard = router::shard_for_flow(flow.flow_id, self.senders.len());
        self.senders[shard]
            .send(flow)
            .map_err(|_| PipelineError::WorkerGone { shard })
    }

    /// Close the queues, join every thread, and return outcomes ordered by
    /// flow id.
    pub fn finish(mut self) -> Result<Vec<FlowOutcome>, PipelineError> {
        self.shutdown()?;
        if let Some((flow_id, error)) = self.aggregator.take_failures().into_iter().next() {
            return Err(PipelineError::Analysis { flow_id, error });
        }
        Ok(self.aggregator.take_outcomes())
    }

    fn shutdown(&mut self) -> Result<(), PipelineError> {
        // Dropping the senders lets workers see the channel disconnect.
        self.senders.clear();
        let mut panicked = false;
        for h in self.worker_handles.drain(..) {
            panicked |= h.join().is_err();
        }
        // Aggregator exits once all worker event senders are dropped.
        if let Some(h) = self.aggregator_handle.take() {
            panicked |= h.join().is_err();
        }
        if panicked || !self.aggregator.all_workers_finished() {
            return Err(PipelineError::WorkerPanicked);
        }
        Ok(())
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn worker_count(config: &PipelineConfig) -> usize {
    if config.num_workers == 0 {
        // Use half the available cores, minimum 1, maximum 8.
        (num_cpus::get() / 2).clamp(1, 8)
    } else {
        config.num_workers
    }
}

/// Spawn the sharded pipeline.
pub fn spawn(config: &PipelineConfig, analyzer: FlowAnalyzer) -> Result<PipelineHandle, PipelineError> {
    let num_workers = worker_count(config);
    tracing::info!(num_workers, "starting sharded pipeline");

    let (agg_tx, agg_rx) = crossbeam_channel::unbounded::<WorkerEvent>();
    let aggregator = AggregatorHandle::new(num_workers);
    let mut handle = PipelineHandle {
        senders: Vec::with_capacity(num_workers),
        aggregator: aggregator.clone(),
        worker_handles: Vec::with_capacity(num_workers),
        aggregator_handle: None,
    };

    for shard_id in 0..num_workers {
        let (flow_tx, flow_rx) = bounded::<FlowPackets>(config.channel_capacity.max(1));
        let agg_tx = agg_tx.clone();
        let worker = thread::Builder::new()
            .name(format!("ts-worker-{}", shard_id))
            .spawn(move || {
                let mut w = worker::Worker::new(shard_id, analyzer);
                w.run(flow_rx, agg_tx);
            })
            .map_err(PipelineError::Spawn)?;
        handle.senders.push(flow_tx);
        handle.worker_handles.push(worker);
    }

    // Only workers may hold event senders, or the aggregator never sees
    // the disconnect.
    drop(agg_tx);

    let aggregator_thread = thread::Builder::new()
        .name("ts-aggregator".into())
        .spawn(move || aggregator::run(agg_rx, aggregator))
        .map_err(PipelineError::Spawn)?;
    handle.aggregator_handle = Some(aggregator_thread);

    Ok(handle)
}

/// Analyse every flow on the pipeline and wait for the results.
pub fn analyze_flows(
    flows: Vec<FlowPackets>,
    analyzer: FlowAnalyzer,
    config: &PipelineConfig,
) -> Result<Vec<FlowOutcome>, PipelineError> {
    let handle = spawn(config, analyzer)?;
    for flow in flows {
        handle.dispatch(flow)?;
    }
    handle.finish()
}
