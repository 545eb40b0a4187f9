// SPDX-License-Identifier: MIT

//! Error kinds surfaced synchronously to callers (spec §7).

use crate::ids::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("node '{0}' is already registered")]
    NodeAlreadyRegistered(NodeId),

    #[error("node '{0}' is not registered")]
    NodeNotFound(NodeId),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
