// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! templar-gateway: the multi-tenant control plane that registers worker
//! nodes, monitors their liveness, and brokers task delegations between
//! them with fault-tolerant fallback, per-target circuit breaking,
//! concurrency caps, and optional durable bookkeeping.

pub mod auth;
pub mod config;
pub mod delegation;
pub mod emitter;
pub mod error;
pub mod health;
pub mod registry;
pub mod router;
pub mod sender;
pub mod store;

pub use auth::{AllowAll, TokenValidator};
pub use config::GatewayConfig;
pub use delegation::{DelegationManager, DelegationManagerConfig};
pub use emitter::Emitter;
pub use error::DelegationError;
pub use health::HealthMonitor;
pub use registry::NodeRegistry;
pub use router::FrameRouter;
pub use sender::NodeSender;
pub use store::{DelegationStore, NoopStore};

#[cfg(test)]
pub mod test_support;
