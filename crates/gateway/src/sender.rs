// SPDX-License-Identifier: MIT

//! Transport-agnostic frame delivery (spec §9, "manager-per-connection vs
//! central"): the Delegation Manager never touches a socket directly, it
//! calls `NodeSender::send_to_node` and the concrete adapter (one
//! connection per node) does the actual write. Mirrors the teacher's
//! `AgentAdapter` trait / `RuntimeRouter` substitution pattern, where
//! production code and tests both implement the same narrow trait.

use async_trait::async_trait;
use templar_core::NodeId;
use templar_wire::Frame;

#[async_trait]
pub trait NodeSender: Send + Sync {
    /// Deliver `frame` to `node_id`. Failure (node disconnected, write
    /// error) is reported but never panics the caller; the delegation
    /// manager treats it the same as "no response arrived".
    async fn send_to_node(&self, node_id: &NodeId, frame: Frame);
}
