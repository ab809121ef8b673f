//! Typed per-packet records and per-flow grouping.

use ahash::AHashMap;
use serde::Serialize;

/// Identifier of a TCP conversation (the dissector's stream index).
pub type FlowId = u64;

/// One TCP segment as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketRecord {
    /// Capture timestamp, seconds since epoch.
    pub timestamp: f64,
    pub flow_id: FlowId,
    /// Relative sequence number of the first payload byte.
    pub seq: u64,
    pub payload_len: u32,
    /// Bytes on the wire, headers included.
    pub frame_len: u32,
}

/// Payload-bearing packets of one flow in arrival order.
#[derive(Debug, Clone)]
pub struct FlowPackets {
    pub flow_id: FlowId,
    pub packets: Vec<PacketRecord>,
}

impl FlowPackets {
    pub fn timestamps(&self) -> Vec<f64> {
        self.packets.iter().map(|p| p.timestamp).collect()
    }
}

/// Split a capture into flows, keeping only segments that carry payload.
///
/// Each flow is stably sorted by timestamp, so packets sharing a timestamp
/// keep their capture order. Flows are returned in ascending id order.
pub fn group_flows(packets: &[PacketRecord]) -> Vec<FlowPackets> {
    let mut by_flow: AHashMap<FlowId, Vec<PacketRecord>> = AHashMap::new();
    for packet in packets.iter().filter(|p| p.payload_len > 0) {
        by_flow.entry(packet.flow_id).or_default().push(*packet);
    }

    let mut flows: Vec<FlowPackets> = by_flow
        .into_iter()
        .map(|(flow_id, mut packets)| {
            packets.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            FlowPackets { flow_id, packets }
        })
        .collect();
    flows.sort_by_key(|f| f.flow_id);
    flows
}
