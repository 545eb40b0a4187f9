// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! templar-core: data model for the Templar Gateway.
//!
//! Holds the node registry's records, the delegation lifecycle types, the
//! per-target circuit breaker, and the typed lifecycle event enum. No I/O
//! lives here — just the shapes the gateway orchestrates and a `Clock`
//! abstraction so time can be faked in tests.

pub mod circuit;
pub mod clock;
pub mod delegation;
pub mod error;
pub mod event;
pub mod ids;
pub mod node;

pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{Clock, FakeClock, SystemClock};
pub use delegation::{
    ActiveDelegation, CandidateOutcome, DelegationRecord, DelegationRequest, DelegationResult,
    DelegationStatus, ResultStatus,
};
pub use error::RegistryError;
pub use event::Event;
pub use ids::{DelegationId, NodeId};
pub use node::{NodeCapabilities, RegisteredNode};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
