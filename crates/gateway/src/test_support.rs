// SPDX-License-Identifier: MIT

//! In-memory test doubles, gated behind `#[cfg(test)]`. Substitutes for a
//! real socket the same way the teacher's `RuntimeRouter` tests swap in a
//! stub `AgentAdapter` instead of spawning a process.

use crate::sender::NodeSender;
use crate::store::DelegationStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use templar_core::{DelegationId, DelegationRecord, DelegationStatus, NodeId};
use templar_wire::Frame;

/// Records every frame handed to it instead of writing to a socket.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(NodeId, Frame)>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_frames(&self) -> Vec<(NodeId, Frame)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NodeSender for RecordingSender {
    async fn send_to_node(&self, node_id: &NodeId, frame: Frame) {
        self.sent.lock().push((node_id.clone(), frame));
    }
}

/// A store whose `create` never resolves, for exercising `storeTimeoutMs`
/// graceful degradation (spec §8.2 S8).
pub struct HangingStore;

#[async_trait]
impl DelegationStore for HangingStore {
    async fn create(&self, _record: DelegationRecord) {
        std::future::pending::<()>().await;
    }

    async fn update(&self, _delegation_id: &DelegationId, _status: DelegationStatus) {
        std::future::pending::<()>().await;
    }
}

/// Records every `update` call, for asserting on store status transitions.
#[derive(Default)]
pub struct RecordingStore {
    pub creates: Mutex<Vec<DelegationRecord>>,
    pub updates: Mutex<Vec<(DelegationId, DelegationStatus)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelegationStore for RecordingStore {
    async fn create(&self, record: DelegationRecord) {
        self.creates.lock().push(record);
    }

    async fn update(&self, delegation_id: &DelegationId, status: DelegationStatus) {
        self.updates.lock().push((delegation_id.clone(), status));
    }
}
