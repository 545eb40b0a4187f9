// SPDX-License-Identifier: MIT

//! Health Monitor (spec §4.3): sweep-based liveness detector.
//!
//! State machine per node:
//! `alive --(sweep tick)--> provisionally not-alive --(pong)--> alive`
//! `                                          --(sweep tick, no pong)--> dead`
//!
//! A live node is pinged every interval and flips dead only after missing
//! one full cycle. This mirrors the registry discipline: we never flip a
//! node straight to dead on a single missed tick.

use crate::emitter::Emitter;
use crate::registry::NodeRegistry;
use crate::sender::NodeSender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use templar_core::{Clock, Event, NodeId, RegisteredNode};
use templar_wire::Frame;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Nodes that were pinged on the previous tick without a pong since.
/// Bridges the "provisionally not-alive" window of spec §4.3.
#[derive(Default)]
struct AwaitingPong {
    node_ids: std::collections::HashSet<NodeId>,
}

pub struct HealthMonitor<C: Clock> {
    clock: C,
    registry: NodeRegistry<C>,
    sender: Arc<dyn NodeSender>,
    sweep_interval: Duration,
    awaiting: Arc<Mutex<AwaitingPong>>,
    dead_tx: broadcast::Sender<RegisteredNode>,
    emitter: Emitter,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock + 'static> HealthMonitor<C> {
    pub fn new(clock: C, registry: NodeRegistry<C>, sender: Arc<dyn NodeSender>, sweep_interval: Duration) -> Self {
        let (dead_tx, _) = broadcast::channel(256);
        Self {
            clock,
            registry,
            sender,
            sweep_interval,
            awaiting: Arc::new(Mutex::new(AwaitingPong::default())),
            dead_tx,
            emitter: Emitter::new(),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Subscribe to `node.dead` notifications. Handlers receive an owned
    /// snapshot (spec §4.3: "not a live reference"). Kept distinct from
    /// [`Self::subscribe`] since callers like the delegation cleanup loop
    /// in the binary entry point want the typed `RegisteredNode`, not the
    /// wrapping `Event`.
    pub fn on_node_dead(&self) -> broadcast::Receiver<RegisteredNode> {
        self.dead_tx.subscribe()
    }

    /// Subscribe to this monitor's lifecycle events (spec §4.3, §6.4).
    /// Gives `Event::NodeDead` a real producer, distinct from
    /// [`crate::delegation::DelegationManager::subscribe`]'s delegation
    /// events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.emitter.subscribe()
    }

    /// Run one sweep tick (spec §4.3 steps 1-2). Exposed directly so tests
    /// can drive ticks deterministically instead of waiting on the
    /// background loop's timer.
    pub fn tick(&self) {
        let awaiting_ids: Vec<NodeId> = self.awaiting.lock().node_ids.iter().cloned().collect();
        for node_id in awaiting_ids {
            if let Some(node) = self.registry.get(&node_id) {
                if !node.is_alive {
                    info!(node_id = %node_id, "node declared dead after missed pong window");
                    self.emitter.emit(Event::NodeDead { node: node.clone() });
                    let _ = self.dead_tx.send(node);
                }
            }
        }
        self.awaiting.lock().node_ids.clear();

        let alive = self.registry.alive_nodes();
        let mut awaiting = self.awaiting.lock();
        for node in alive {
            self.registry.mark_dead(&node.node_id);
            awaiting.node_ids.insert(node.node_id.clone());
            debug!(node_id = %node.node_id, "pinging node");
            let sender = self.sender.clone();
            let node_id = node.node_id.clone();
            let timestamp_ms = self.clock.epoch_ms();
            tokio::spawn(async move {
                sender.send_to_node(&node_id, Frame::HeartbeatPing { timestamp_ms }).await;
            });
        }
    }

    pub fn handle_pong(&self, node_id: &NodeId) {
        self.registry.mark_alive(node_id);
        self.awaiting.lock().node_ids.remove(node_id);
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let interval = this.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.tick();
            }
        });
        *self.handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        self.awaiting.lock().node_ids.clear();
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
