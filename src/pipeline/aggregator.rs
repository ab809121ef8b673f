//! Aggregator: collects flow outcomes from all worker shards.

use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::analysis::stats::StatsError;
use crate::flow::FlowOutcome;
use crate::packet::FlowId;

use super::worker::WorkerEvent;

/// Shared state the main thread reads once the pipeline has drained.
#[derive(Clone)]
pub struct AggregatorHandle {
    inner: Arc<Mutex<AggregatorState>>,
}

struct AggregatorState {
    num_workers: usize,
    finished_workers: usize,
    outcomes: Vec<FlowOutcome>,
    failures: Vec<(FlowId, StatsError)>,
}

impl AggregatorHandle {
    pub fn new(num_workers: usize) -> Self {
        AggregatorHandle {
            inner: Arc::new(Mutex::new(AggregatorState {
                num_workers,
                finished_workers: 0,
                outcomes: Vec::new(),
                failures: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True once every worker has sent its shutdown event.
    pub fn all_workers_finished(&self) -> bool {
        let state = self.lock();
        state.finished_workers >= state.num_workers
    }

    /// Collected outcomes ordered by flow id, independent of which shard
    /// finished first.
    pub fn take_outcomes(&self) -> Vec<FlowOutcome> {
        let mut outcomes = std::mem::take(&mut self.lock().outcomes);
        outcomes.sort_by_key(FlowOutcome::flow_id);
        outcomes
    }

    pub fn take_failures(&self) -> Vec<(FlowId, StatsError)> {
        let mut failures = std::mem::take(&mut self.lock().failures);
        failures.sort_by_key(|(id, _)| *id);
        failures
    }
}

/// Run the aggregator loop. Blocks until all worker senders disconnect.
pub fn run(rx: Receiver<WorkerEvent>, handle: AggregatorHandle) {
    for event in rx.iter() {
        let mut state = handle.lock();
        match event {
            WorkerEvent::Outcome(outcome) => state.outcomes.push(outcome),
            WorkerEvent::Failed { flow_id, error } => state.failures.push((flow_id, error)),
            WorkerEvent::Shutdown(shutdown) => {
                state.finished_workers += 1;
                tracing::trace!(
                    shard = shutdown.shard_id,
                    flows = shutdown.flows,
                    "shard finished"
                );
            }
        }
    }

    tracing::debug!("aggregator shut down");
}
