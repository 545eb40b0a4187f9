// SPDX-License-Identifier: MIT

//! Frame router (spec §2, "Frame router"): decodes inbound wire frames from
//! a node connection and dispatches to the Registry, Health Monitor, or
//! Delegation Manager. Thin on purpose — every actual state transition
//! lives in the collaborator it forwards to.

use crate::error::DelegationError;
use crate::health::HealthMonitor;
use crate::registry::NodeRegistry;
use std::sync::Arc;
use templar_core::{Clock, NodeCapabilities, NodeId, RegistryError};
use templar_wire::Frame;
use tracing::{info, warn};

use crate::delegation::DelegationManager;

pub struct FrameRouter<C: Clock + 'static> {
    registry: NodeRegistry<C>,
    health: Arc<HealthMonitor<C>>,
    delegation: Arc<DelegationManager<C>>,
}

impl<C: Clock + 'static> FrameRouter<C> {
    pub fn new(registry: NodeRegistry<C>, health: Arc<HealthMonitor<C>>, delegation: Arc<DelegationManager<C>>) -> Self {
        Self { registry, health, delegation }
    }

    /// Registers a newly-connected node. Called once per connection before
    /// entering the frame loop, since liveness tracking and delegation
    /// targeting both require the node to already exist in the registry.
    pub fn register_node(&self, node_id: NodeId, capabilities: NodeCapabilities) -> Result<(), RegistryError> {
        self.registry.register(node_id, capabilities).map(|_| ())
    }

    /// Tears down everything a disconnected connection owned: the registry
    /// entry and any delegation still routed through it.
    pub async fn handle_disconnect(&self, node_id: &NodeId) {
        let _ = self.registry.deregister(node_id);
        self.delegation.cleanup_node(node_id).await;
    }

    /// Dispatches one inbound frame from `node_id`'s connection. Never
    /// returns a hard error for frame content the gateway simply doesn't
    /// expect inbound (spec §7: connection-level faults close the
    /// connection; content the router can't route is logged and dropped).
    pub async fn dispatch(&self, node_id: &NodeId, frame: Frame) -> Result<(), DelegationError> {
        match frame {
            Frame::NodeDeregister { node_id: target } => {
                if &target != node_id {
                    warn!(from = %node_id, claimed = %target, "node tried to deregister another node id");
                    return Err(DelegationError::UnknownNode(target));
                }
                self.registry.deregister(&target).map_err(|_| DelegationError::UnknownNode(target))?;
            }
            Frame::HeartbeatPong { node_id: target, .. } => {
                self.health.handle_pong(&target);
            }
            Frame::DelegationAccept { .. } | Frame::DelegationResult { .. } => {
                self.delegation.handle_delegation_frame(frame).await;
            }
            Frame::DelegationCancel { delegation_id, reason } => {
                if !self.delegation.cancel(&delegation_id, &reason).await {
                    warn!(node_id = %node_id, delegation_id = %delegation_id, "cancel received for an unknown delegation");
                    return Err(DelegationError::UnknownDelegation(delegation_id));
                }
            }
            Frame::LaneMessage { .. } => {
                info!(node_id = %node_id, "lane message received, no gateway-side handling defined");
            }
            other => {
                warn!(node_id = %node_id, kind = other.kind(), "unexpected frame on a node connection");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
