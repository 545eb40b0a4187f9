// SPDX-License-Identifier: MIT

//! Delegation Manager (spec §4.4): the lifecycle engine for
//! request → accept → result, with fallback, circuit breaking, per-node
//! time budgeting, sweep expiry, and graceful store degradation. The
//! dominant component of the gateway, same proportion the spec calls out
//! (~55% of core).

mod manager;

pub use manager::{DelegationManager, DelegationManagerConfig};
