// SPDX-License-Identifier: MIT

//! Delegation lifecycle types (spec §3.3, §3.5, §4.4).

use crate::ids::{DelegationId, NodeId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Caller-supplied request to `DelegationManager::delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub delegation_id: DelegationId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub intent: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub fallback_node_ids: Vec<NodeId>,
    pub timeout_ms: u64,
}

/// Terminal outcome of `DelegationManager::delegate` (spec §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Completed,
    Refused,
    Failed,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl DelegationResult {
    pub fn new(status: ResultStatus) -> Self {
        Self { status, result: None }
    }

    pub fn completed(result: Option<serde_json::Value>) -> Self {
        Self { status: ResultStatus::Completed, result }
    }
}

/// How a single candidate target resolved, for reporting in the
/// `delegation:exhausted` event (spec §9, open question on skipped candidates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Refused { node_id: NodeId },
    Failed { node_id: NodeId, reason: String },
    SkippedOpenCircuit { node_id: NodeId },
}

impl CandidateOutcome {
    pub fn node_id(&self) -> &NodeId {
        match self {
            CandidateOutcome::Refused { node_id }
            | CandidateOutcome::Failed { node_id, .. }
            | CandidateOutcome::SkippedOpenCircuit { node_id } => node_id,
        }
    }
}

/// Persisted audit status (spec §3.5). Broader than [`ResultStatus`] because
/// it also tracks the in-flight `accepted` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Pending,
    Accepted,
    Refused,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

/// Write-only audit record handed to the optional [`crate`] delegation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub delegation_id: DelegationId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub intent: String,
    pub status: DelegationStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// A delegation tracked by the manager while it is in flight (spec §3.3).
///
/// Not `Serialize` — this is live orchestration state, not a wire or store
/// shape. The invariant from §3.3 holds for as long as this struct lives in
/// the manager's table: exactly one outstanding resolver, one active cancel
/// token, and a contribution of 1 to `nodeActiveCounts[from_node_id]`.
#[derive(Debug, Clone)]
pub struct ActiveDelegation {
    pub delegation_id: DelegationId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub intent: String,
    pub created_at_ms: u64,
    pub cancel: CancellationToken,
    pub current_node_id: NodeId,
}

impl ActiveDelegation {
    pub fn new(req: &DelegationRequest, now_ms: u64) -> Self {
        Self {
            delegation_id: req.delegation_id.clone(),
            from_node_id: req.from_node_id.clone(),
            to_node_id: req.to_node_id.clone(),
            intent: req.intent.clone(),
            created_at_ms: now_ms,
            cancel: CancellationToken::new(),
            current_node_id: req.to_node_id.clone(),
        }
    }
}

#[cfg(test)]
#[path = "delegation_tests.rs"]
mod tests;
