// SPDX-License-Identifier: MIT

//! Lifecycle events emitted by the Health Monitor and Delegation Manager
//! (spec §4.3, §4.4.1, §6.4).
//!
//! Serializes with `{"type": "delegation:started", ...}` shape, the same
//! tagged-enum convention the rest of the wire-adjacent types in this
//! workspace use.

use crate::delegation::CandidateOutcome;
use crate::ids::{DelegationId, NodeId};
use crate::node::RegisteredNode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "node:dead")]
    NodeDead {
        /// Snapshot at time of death, not a live reference (spec §4.3).
        node: RegisteredNode,
    },

    #[serde(rename = "delegation:started")]
    DelegationStarted { delegation_id: DelegationId, from_node_id: NodeId, to_node_id: NodeId },

    #[serde(rename = "delegation:accepted")]
    DelegationAccepted { delegation_id: DelegationId, node_id: NodeId },

    /// Per-target failure. Not a terminal event for the delegation as a
    /// whole — see spec §8.1 "Termination emits".
    #[serde(rename = "delegation:failed")]
    DelegationFailed { delegation_id: DelegationId, target: NodeId, reason: String },

    #[serde(rename = "delegation:completed")]
    DelegationCompleted { delegation_id: DelegationId, node_id: NodeId },

    #[serde(rename = "delegation:cancelled")]
    DelegationCancelled { delegation_id: DelegationId, reason: String },

    #[serde(rename = "delegation:exhausted")]
    DelegationExhausted { delegation_id: DelegationId, candidates: Vec<CandidateOutcome> },
}

impl Event {
    /// A short one-line rendering for log spans, mirroring the
    /// `log_summary` helper the teacher's `Event` type exposes.
    pub fn log_summary(&self) -> String {
        match self {
            Event::NodeDead { node } => format!("node:dead node={}", node.node_id),
            Event::DelegationStarted { delegation_id, from_node_id, to_node_id } => format!(
                "delegation:started id={delegation_id} from={from_node_id} to={to_node_id}"
            ),
            Event::DelegationAccepted { delegation_id, node_id } => {
                format!("delegation:accepted id={delegation_id} node={node_id}")
            }
            Event::DelegationFailed { delegation_id, target, reason } => {
                format!("delegation:failed id={delegation_id} target={target} reason={reason}")
            }
            Event::DelegationCompleted { delegation_id, node_id } => {
                format!("delegation:completed id={delegation_id} node={node_id}")
            }
            Event::DelegationCancelled { delegation_id, reason } => {
                format!("delegation:cancelled id={delegation_id} reason={reason}")
            }
            Event::DelegationExhausted { delegation_id, candidates } => {
                format!("delegation:exhausted id={delegation_id} candidates={}", candidates.len())
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
