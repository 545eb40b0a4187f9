// SPDX-License-Identifier: MIT

//! Internal bookkeeping errors for the gateway (spec §7).
//!
//! `DelegationError` never escapes `DelegationManager::delegate`'s public
//! surface — that method always returns `Ok(DelegationResult)`. This enum
//! exists for the handful of call sites (frame router, node sender wiring)
//! that need a typed error to propagate instead of a result status.

use templar_core::{DelegationId, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),

    #[error("delegation {0} is not active")]
    UnknownDelegation(DelegationId),
}
