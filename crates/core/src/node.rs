// SPDX-License-Identifier: MIT

//! Node capability and registration records (spec §3.1, §3.2).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What a node can do. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    agent_types: HashSet<String>,
    tools: HashSet<String>,
    channels: HashSet<String>,
    pub max_concurrency: u32,
}

/// Error constructing a [`NodeCapabilities`] with no agent types.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("node capabilities must declare at least one agent type")]
pub struct EmptyAgentTypes;

impl NodeCapabilities {
    pub fn new(
        agent_types: impl IntoIterator<Item = String>,
        tools: impl IntoIterator<Item = String>,
        channels: impl IntoIterator<Item = String>,
        max_concurrency: u32,
    ) -> Result<Self, EmptyAgentTypes> {
        let agent_types: HashSet<String> = agent_types.into_iter().collect();
        if agent_types.is_empty() {
            return Err(EmptyAgentTypes);
        }
        Ok(Self { agent_types, tools: tools.into_iter().collect(), channels: channels.into_iter().collect(), max_concurrency })
    }

    pub fn agent_types(&self) -> &HashSet<String> {
        &self.agent_types
    }

    pub fn tools(&self) -> &HashSet<String> {
        &self.tools
    }

    pub fn channels(&self) -> &HashSet<String> {
        &self.channels
    }

    pub fn has_agent_type(&self, agent_type: &str) -> bool {
        self.agent_types.contains(agent_type)
    }

    pub fn has_all_tools<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> bool {
        required.into_iter().all(|t| self.tools.contains(t))
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }
}

/// A connected node as tracked by the [`crate`] registry.
///
/// The capability sets (`agent_types`/`tools`/`channels`) live on
/// [`NodeCapabilities`] itself, already stored as `HashSet`s so
/// `findByRequirements` lookups are O(1) per predicate without any
/// separate derived-index bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredNode {
    pub node_id: crate::ids::NodeId,
    pub capabilities: NodeCapabilities,
    pub registered_at_ms: u64,
    pub is_alive: bool,
    pub last_pong_ms: u64,
}

impl RegisteredNode {
    pub fn new(node_id: crate::ids::NodeId, capabilities: NodeCapabilities, now_ms: u64) -> Self {
        Self { node_id, capabilities, registered_at_ms: now_ms, is_alive: true, last_pong_ms: now_ms }
    }

    /// Requirements a caller is matching candidate nodes against
    /// (spec §4.2 `findByRequirements`).
    pub fn matches(&self, req: &Requirements<'_>) -> bool {
        self.is_alive
            && self.capabilities.has_agent_type(req.agent_type)
            && req.tools.iter().all(|t| self.capabilities.tools().contains(*t))
            && req.channel.map(|c| self.capabilities.has_channel(c)).unwrap_or(true)
    }
}

/// Matching criteria for [`RegisteredNode::matches`].
#[derive(Debug, Clone, Copy)]
pub struct Requirements<'a> {
    pub agent_type: &'a str,
    pub tools: &'a [&'a str],
    pub channel: Option<&'a str>,
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
