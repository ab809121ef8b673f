//! Per-shard worker: runs the flow analyzer on each flow it receives and
//! forwards the outcome to the aggregator.

use crossbeam_channel::{Receiver, Sender};

use crate::analysis::stats::StatsError;
use crate::flow::{FlowAnalyzer, FlowOutcome};
use crate::packet::{FlowId, FlowPackets};

/// Events a worker sends to the aggregator.
#[derive(Debug)]
pub enum WorkerEvent {
    Outcome(FlowOutcome),
    Failed { flow_id: FlowId, error: StatsError },
    /// Worker's input channel closed; no more events from this shard.
    Shutdown(ShardShutdown),
}

#[derive(Debug, Clone, Copy)]
pub struct ShardShutdown {
    pub shard_id: usize,
    pub flows: u64,
}

pub struct Worker {
    shard_id: usize,
    analyzer: FlowAnalyzer,
    flows: u64,
}

impl Worker {
    pub fn new(shard_id: usize, analyzer: FlowAnalyzer) -> Self {
        Worker {
            shard_id,
            analyzer,
            flows: 0,
        }
    }

    /// Process flows until the dispatcher drops its sender.
    pub fn run(&mut self, rx: Receiver<FlowPackets>, agg_tx: Sender<WorkerEvent>) {
        for flow in rx.iter() {
            self.process_flow(&flow, &agg_tx);
        }

        let _ = agg_tx.send(WorkerEvent::Shutdown(ShardShutdown {
            shard_id: self.shard_id,
            flows: self.flows,
        }));

        tracing::debug!(shard = self.shard_id, flows = self.flows, "worker shut down");
    }

    fn process_flow(&mut self, flow: &FlowPackets, agg_tx: &Sender<WorkerEvent>) {
        self.flows += 1;
        let event = match self.analyzer.analyze(flow) {
            Ok(outcome) => WorkerEvent::Outcome(outcome),
            Err(error) => {
                tracing::warn!(shard = self.shard_id, flow = flow.flow_id, %error, "flow analysis failed");
                WorkerEvent::Failed {
                    flow_id: flow.flow_id,
                    error,
                }
            }
        };
        let _ = agg_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::packet::PacketRecord;

    fn flow(flow_id: FlowId, n: usize) -> FlowPackets {
        let packets = (0..n)
            .map(|i| PacketRecord {
                timestamp: i as f64 * 1e-5,
                flow_id,
                seq: i as u64 * 100,
                payload_len: 100,
                frame_len: 154,
            })
            .collect();
        FlowPackets { flow_id, packets }
    }

    #[test]
    fn worker_reports_each_flow_then_shuts_down() {
        let widths = AnalysisConfig::default().bin_widths().unwrap();
        let mut worker = Worker::new(3, FlowAnalyzer::new(widths, 5));
        let (tx, rx) = crossbeam_channel::unbounded();
        let (agg_tx, agg_rx) = crossbeam_channel::unbounded();

        tx.send(flow(1, 10)).unwrap();
        tx.send(flow(2, 2)).unwrap();
        drop(tx);
        worker.run(rx, agg_tx);

        let events: Vec<WorkerEvent> = agg_rx.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], WorkerEvent::Outcome(FlowOutcome::Analysed(m)) if m.flow_id == 1));
        assert!(matches!(&events[1], WorkerEvent::Outcome(FlowOutcome::Skipped(s)) if s.flow_id == 2));
        assert!(matches!(
            events[2],
            WorkerEvent::Shutdown(ShardShutdown { shard_id: 3, flows: 2 })
        ));
    }
}
