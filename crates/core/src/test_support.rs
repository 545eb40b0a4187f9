// SPDX-License-Identifier: MIT

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::delegation::DelegationRequest;
use crate::ids::{DelegationId, NodeId};
use crate::node::{NodeCapabilities, RegisteredNode};

/// Proptest strategies for core state machine types.
#[cfg(feature = "proptest")]
pub mod strategies {
    use crate::ids::NodeId;
    use proptest::prelude::*;

    pub fn arb_node_id() -> impl Strategy<Value = NodeId> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,8}".prop_map(NodeId::new)
    }

    pub fn arb_small_string_set(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z]{2,6}", 0..=max)
    }
}

pub fn node_capabilities(agent_types: &[&str]) -> NodeCapabilities {
    NodeCapabilities::new(
        agent_types.iter().map(|s| s.to_string()),
        Vec::<String>::new(),
        Vec::<String>::new(),
        4,
    )
    .expect("at least one agent type in test fixture")
}

pub fn registered_node(id: &str, agent_types: &[&str], now_ms: u64) -> RegisteredNode {
    RegisteredNode::new(NodeId::new(id), node_capabilities(agent_types), now_ms)
}

pub fn delegation_request(id: &str, from: &str, to: &str, fallbacks: &[&str], timeout_ms: u64) -> DelegationRequest {
    DelegationRequest {
        delegation_id: DelegationId::new(id),
        from_node_id: NodeId::new(from),
        to_node_id: NodeId::new(to),
        intent: "test-intent".to_string(),
        payload: serde_json::Value::Null,
        fallback_node_ids: fallbacks.iter().map(|f| NodeId::new(*f)).collect(),
        timeout_ms,
    }
}
