// SPDX-License-Identifier: MIT

//! Gateway configuration (spec §4.4.2, §3.4, §6.1).

use serde::{Deserialize, Serialize};
use templar_core::CircuitBreakerConfig;

fn default_bind_addr() -> String {
    "0.0.0.0:7420".to_string()
}

fn default_max_active_delegations() -> u32 {
    100
}

fn default_max_per_node_delegations() -> u32 {
    10
}

fn default_max_delegation_ttl_ms() -> u64 {
    10 * 60 * 1000
}

fn default_sweep_interval_ms() -> u64 {
    60 * 1000
}

fn default_min_node_timeout_ms() -> u64 {
    3_000
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_max_frame_bytes() -> u32 {
    templar_wire::DEFAULT_MAX_FRAME_BYTES
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_cooldown_ms() -> u64 {
    30_000
}

/// All tunables for the gateway, deserializable from TOML. Every field has
/// a `#[serde(default = ...)]` so a partial or absent config file still
/// produces a fully-specified gateway (`GatewayConfig::default()` is the
/// canonical source of truth for the values named in spec §4.4.2 / §3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub max_active_delegations: u32,
    pub max_per_node_delegations: u32,
    pub max_delegation_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub min_node_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub max_frame_bytes: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooldown_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_active_delegations: default_max_active_delegations(),
            max_per_node_delegations: default_max_per_node_delegations(),
            max_delegation_ttl_ms: default_max_delegation_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            min_node_timeout_ms: default_min_node_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_cooldown_ms: default_circuit_breaker_cooldown_ms(),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_threshold,
            cooldown: std::time::Duration::from_millis(self.circuit_breaker_cooldown_ms),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
