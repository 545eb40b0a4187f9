// SPDX-License-Identifier: MIT

//! Typed pub-sub for lifecycle events (spec §2 "Emitter", §6.4).
//!
//! A thin wrapper over `tokio::sync::broadcast` rather than a bespoke
//! listener-list, since subscribers here are always async tasks (tests,
//! future HTTP/metrics bridges) and broadcast already gives us "subscribers
//! run independently, a slow one never blocks the emitter" for free —
//! stronger than spec §6.4's "must not block" requirement, not weaker.

use templar_core::Event;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Emitter {
    tx: broadcast::Sender<Event>,
}

impl Emitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        tracing::info!(summary = %event.log_summary(), "event");
        let _ = self.tx.send(event);
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
