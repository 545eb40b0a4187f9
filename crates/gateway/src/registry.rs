// SPDX-License-Identifier: MIT

//! Node Registry (spec §4.2): authoritative node directory, capability-based
//! lookup, liveness flag storage.
//!
//! Mutated from the frame-dispatch path and read from sweeps (spec §5);
//! guarded by a single `parking_lot::Mutex` rather than copy-on-write map
//! replacement, following the teacher's `RuntimeRouter` convention of a
//! `Mutex<HashMap<..>>` behind a cheaply `Clone`-able handle. The invariant
//! from §3.2 — a node is never observed without its capability set — holds
//! trivially because capabilities live inside `RegisteredNode` itself.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use templar_core::{Clock, NodeCapabilities, NodeId, RegisteredNode, RegistryError, Requirements};
use tracing::{info, warn};

#[derive(Clone)]
pub struct NodeRegistry<C: Clock> {
    clock: C,
    nodes: Arc<Mutex<HashMap<NodeId, RegisteredNode>>>,
    /// Registration order, for `findByRequirements`'s ordering guarantee (§4.2).
    order: Arc<Mutex<Vec<NodeId>>>,
}

impl<C: Clock> NodeRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, nodes: Arc::new(Mutex::new(HashMap::new())), order: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn register(&self, node_id: NodeId, capabilities: NodeCapabilities) -> Result<RegisteredNode, RegistryError> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(&node_id) {
            return Err(RegistryError::NodeAlreadyRegistered(node_id));
        }
        let node = RegisteredNode::new(node_id.clone(), capabilities, self.clock.epoch_ms());
        nodes.insert(node_id.clone(), node.clone());
        self.order.lock().push(node_id.clone());
        info!(node_id = %node_id, "node registered");
        Ok(node)
    }

    pub fn deregister(&self, node_id: &NodeId) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.lock();
        if nodes.remove(node_id).is_none() {
            return Err(RegistryError::NodeNotFound(node_id.clone()));
        }
        self.order.lock().retain(|id| id != node_id);
        info!(node_id = %node_id, "node deregistered");
        Ok(())
    }

    pub fn get(&self, node_id: &NodeId) -> Option<RegisteredNode> {
        self.nodes.lock().get(node_id).cloned()
    }

    /// Matching rule per spec §4.2: alive, agent type present, tool subset,
    /// optional channel membership. Returned in registration order.
    pub fn find_by_requirements(&self, req: &Requirements<'_>) -> Vec<RegisteredNode> {
        let nodes = self.nodes.lock();
        self.order
            .lock()
            .iter()
            .filter_map(|id| nodes.get(id))
            .filter(|node| node.matches(req))
            .cloned()
            .collect()
    }

    pub fn mark_alive(&self, node_id: &NodeId) {
        if let Some(node) = self.nodes.lock().get_mut(node_id) {
            node.is_alive = true;
            node.last_pong_ms = self.clock.epoch_ms();
        }
    }

    pub fn mark_dead(&self, node_id: &NodeId) {
        if let Some(node) = self.nodes.lock().get_mut(node_id) {
            if node.is_alive {
                warn!(node_id = %node_id, "node marked not-alive");
            }
            node.is_alive = false;
        }
    }

    pub fn all(&self) -> Vec<RegisteredNode> {
        let nodes = self.nodes.lock();
        self.order.lock().iter().filter_map(|id| nodes.get(id)).cloned().collect()
    }

    pub fn alive_nodes(&self) -> Vec<RegisteredNode> {
        self.all().into_iter().filter(|n| n.is_alive).collect()
    }

    pub fn size(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn clear(&self) {
        self.nodes.lock().clear();
        self.order.lock().clear();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "registry_property_tests.rs"]
mod property_tests;
