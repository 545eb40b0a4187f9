// SPDX-License-Identifier: MIT

//! Delegation Store (spec §6.3): an optional, write-only audit sink.
//!
//! Two methods, a no-op default implementation, same "narrow capability
//! interface" shape as the wire `NodeSender`. The gateway never reads back
//! from the store and any failure — including timeout — is swallowed by
//! the caller (`DelegationManager`), never here.

use async_trait::async_trait;
use templar_core::{DelegationId, DelegationRecord, DelegationStatus};

#[async_trait]
pub trait DelegationStore: Send + Sync {
    async fn create(&self, record: DelegationRecord);
    async fn update(&self, delegation_id: &DelegationId, status: DelegationStatus);
}

/// The default collaborator when no durable store is configured.
pub struct NoopStore;

#[async_trait]
impl DelegationStore for NoopStore {
    async fn create(&self, _record: DelegationRecord) {}
    async fn update(&self, _delegation_id: &DelegationId, _status: DelegationStatus) {}
}
