// SPDX-License-Identifier: MIT

//! Wire frames exchanged between gateway and node connections (spec §3.6).

use serde::{Deserialize, Serialize};
use templar_core::{DelegationId, NodeCapabilities, NodeId};

/// Discriminated union of every frame kind on the wire. Tagged by `kind`,
/// matching `templar-core::Event`'s `type` tag convention for the same
/// reason: one string field a reader can grep for in a packet capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Frame {
    #[serde(rename = "node.register")]
    NodeRegister { node_id: NodeId, capabilities: NodeCapabilities },

    #[serde(rename = "node.register.ack")]
    NodeRegisterAck { node_id: NodeId },

    #[serde(rename = "node.deregister")]
    NodeDeregister { node_id: NodeId },

    #[serde(rename = "heartbeat.ping")]
    HeartbeatPing { timestamp_ms: u64 },

    #[serde(rename = "heartbeat.pong")]
    HeartbeatPong { node_id: NodeId, timestamp_ms: u64 },

    #[serde(rename = "delegation.request")]
    DelegationRequest {
        delegation_id: DelegationId,
        from_node_id: NodeId,
        to_node_id: NodeId,
        #[serde(default)]
        scope: Option<String>,
        intent: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        fallback_node_ids: Vec<NodeId>,
        timeout_ms: u64,
    },

    #[serde(rename = "delegation.accept")]
    DelegationAccept { delegation_id: DelegationId, node_id: NodeId },

    #[serde(rename = "delegation.result")]
    DelegationResult {
        delegation_id: DelegationId,
        status: FrameResultStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },

    #[serde(rename = "delegation.cancel")]
    DelegationCancel { delegation_id: DelegationId, reason: String },

    #[serde(rename = "lane.message")]
    LaneMessage { payload: serde_json::Value },
}

/// Status carried on the wire by `delegation.result` (spec §3.6). A strict
/// subset of `templar_core::ResultStatus`: a node can only ever report
/// completed/refused/failed about itself, never timeout or cancelled —
/// those are the gateway's own verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameResultStatus {
    Completed,
    Refused,
    Failed,
}

impl Frame {
    /// `kind` string as it appears on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::NodeRegister { .. } => "node.register",
            Frame::NodeRegisterAck { .. } => "node.register.ack",
            Frame::NodeDeregister { .. } => "node.deregister",
            Frame::HeartbeatPing { .. } => "heartbeat.ping",
            Frame::HeartbeatPong { .. } => "heartbeat.pong",
            Frame::DelegationRequest { .. } => "delegation.request",
            Frame::DelegationAccept { .. } => "delegation.accept",
            Frame::DelegationResult { .. } => "delegation.result",
            Frame::DelegationCancel { .. } => "delegation.cancel",
            Frame::LaneMessage { .. } => "lane.message",
        }
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
