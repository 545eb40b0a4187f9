// SPDX-License-Identifier: MIT

use crate::config::GatewayConfig;
use crate::emitter::Emitter;
use crate::registry::NodeRegistry;
use crate::sender::NodeSender;
use crate::store::DelegationStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use templar_core::{
    ActiveDelegation, CandidateOutcome, CircuitBreaker, CircuitBreakerConfig, Clock,
    DelegationId, DelegationRecord, DelegationRequest, DelegationResult, DelegationStatus, Event,
    NodeId, ResultStatus,
};
use templar_wire::{Frame, FrameResultStatus};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delegation Manager tunables (spec §4.4.2), narrowed from the full
/// [`GatewayConfig`] to the subset this component owns.
#[derive(Debug, Clone, Copy)]
pub struct DelegationManagerConfig {
    pub max_active_delegations: u32,
    pub max_per_node_delegations: u32,
    pub max_delegation_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub min_node_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl From<&GatewayConfig> for DelegationManagerConfig {
    fn from(cfg: &GatewayConfig) -> Self {
        Self {
            max_active_delegations: cfg.max_active_delegations,
            max_per_node_delegations: cfg.max_per_node_delegations,
            max_delegation_ttl_ms: cfg.max_delegation_ttl_ms,
            sweep_interval_ms: cfg.sweep_interval_ms,
            min_node_timeout_ms: cfg.min_node_timeout_ms,
            store_timeout_ms: cfg.store_timeout_ms,
            circuit_breaker: cfg.circuit_breaker_config(),
        }
    }
}

/// Outcome of a single `tryNode` call (spec §4.4.4). Only a `completed`
/// wire result settles the delegation; everything else — refused, failed,
/// timed out, skipped — feeds back into the exhausted-event candidate list.
enum TryOutcome {
    Completed(Option<serde_json::Value>),
    NotCompleted(CandidateOutcome),
}

pub struct DelegationManager<C: Clock> {
    config: DelegationManagerConfig,
    clock: C,
    registry: NodeRegistry<C>,
    sender: Arc<dyn NodeSender>,
    store: Arc<dyn DelegationStore>,
    emitter: Emitter,
    active: Arc<Mutex<HashMap<DelegationId, ActiveDelegation>>>,
    node_active_counts: Arc<Mutex<HashMap<NodeId, u32>>>,
    breakers: Arc<Mutex<HashMap<NodeId, CircuitBreaker>>>,
    pending_resolvers: Arc<Mutex<HashMap<DelegationId, oneshot::Sender<Frame>>>>,
    unmatched_frame_count: Arc<AtomicU64>,
    sweep_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<C: Clock> Clone for DelegationManager<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            clock: self.clock.clone(),
            registry: self.registry.clone(),
            sender: self.sender.clone(),
            store: self.store.clone(),
            emitter: self.emitter.clone(),
            active: self.active.clone(),
            node_active_counts: self.node_active_counts.clone(),
            breakers: self.breakers.clone(),
            pending_resolvers: self.pending_resolvers.clone(),
            unmatched_frame_count: self.unmatched_frame_count.clone(),
            sweep_handle: self.sweep_handle.clone(),
        }
    }
}

impl<C: Clock + 'static> DelegationManager<C> {
    pub fn new(
        clock: C,
        registry: NodeRegistry<C>,
        sender: Arc<dyn NodeSender>,
        store: Arc<dyn DelegationStore>,
        config: DelegationManagerConfig,
    ) -> Self {
        Self {
            config,
            clock,
            registry,
            sender,
            store,
            emitter: Emitter::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
            node_active_counts: Arc::new(Mutex::new(HashMap::new())),
            breakers: Arc::new(Mutex::new(HashMap::new())),
            pending_resolvers: Arc::new(Mutex::new(HashMap::new())),
            unmatched_frame_count: Arc::new(AtomicU64::new(0)),
            sweep_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.emitter.subscribe()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn pending_resolver_count(&self) -> usize {
        self.pending_resolvers.lock().len()
    }

    pub fn unmatched_frame_count(&self) -> u64 {
        self.unmatched_frame_count.load(Ordering::Relaxed)
    }

    fn record_success(&self, node_id: &NodeId) {
        self.breakers
            .lock()
            .entry(node_id.clone())
            .or_insert_with(|| CircuitBreaker::new(self.config.circuit_breaker))
            .record_success();
    }

    fn record_failure(&self, node_id: &NodeId) {
        self.breakers
            .lock()
            .entry(node_id.clone())
            .or_insert_with(|| CircuitBreaker::new(self.config.circuit_breaker))
            .record_failure(&self.clock);
    }

    fn breaker_blocks(&self, node_id: &NodeId) -> bool {
        let mut breakers = self.breakers.lock();
        let breaker = breakers
            .entry(node_id.clone())
            .or_insert_with(|| CircuitBreaker::new(self.config.circuit_breaker));
        breaker.is_open() && !breaker.allows_probe(&self.clock)
    }

    async fn store_create(&self, record: DelegationRecord) {
        let timeout = Duration::from_millis(self.config.store_timeout_ms);
        if tokio::time::timeout(timeout, self.store.create(record)).await.is_err() {
            warn!("delegation store create timed out");
        }
    }

    async fn store_update(&self, delegation_id: &DelegationId, status: DelegationStatus) {
        let timeout = Duration::from_millis(self.config.store_timeout_ms);
        if tokio::time::timeout(timeout, self.store.update(delegation_id, status)).await.is_err() {
            warn!(delegation_id = %delegation_id, "delegation store update timed out");
        }
    }

    /// Removes the active-delegation bookkeeping for `delegation_id` if it
    /// is still present. Idempotent: a no-op when `cancel` already tore the
    /// entry down, so both conclusion paths can call it safely.
    fn cleanup(&self, delegation_id: &DelegationId) {
        let removed = self.active.lock().remove(delegation_id);
        if let Some(active) = removed {
            let mut counts = self.node_active_counts.lock();
            if let Some(count) = counts.get_mut(&active.from_node_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&active.from_node_id);
                }
            }
        }
        self.pending_resolvers.lock().remove(delegation_id);
    }

    /// spec §4.4.3: admission, setup, primary attempt, ordered fallback.
    pub async fn delegate(&self, req: DelegationRequest) -> DelegationResult {
        let now = self.clock.epoch_ms();

        // Admission check and insert happen under one critical section
        // spanning both tables, so two `delegate` calls racing on the same
        // node can never both observe a cap as not-yet-reached and both
        // get admitted (spec §5: "mutations must appear atomic").
        let cancel = {
            let mut active = self.active.lock();
            let mut counts = self.node_active_counts.lock();
            if active.len() as u32 >= self.config.max_active_delegations {
                return DelegationResult::new(ResultStatus::Failed);
            }
            let per_node = *counts.get(&req.from_node_id).unwrap_or(&0);
            if per_node >= self.config.max_per_node_delegations {
                return DelegationResult::new(ResultStatus::Failed);
            }
            let entry = ActiveDelegation::new(&req, now);
            let cancel = entry.cancel.clone();
            active.insert(req.delegation_id.clone(), entry);
            *counts.entry(req.from_node_id.clone()).or_insert(0) += 1;
            cancel
        };

        self.store_create(DelegationRecord {
            delegation_id: req.delegation_id.clone(),
            from_node_id: req.from_node_id.clone(),
            to_node_id: req.to_node_id.clone(),
            intent: req.intent.clone(),
            status: DelegationStatus::Pending,
            created_at_ms: now,
            updated_at_ms: now,
        })
        .await;

        self.emitter.emit(Event::DelegationStarted {
            delegation_id: req.delegation_id.clone(),
            from_node_id: req.from_node_id.clone(),
            to_node_id: req.to_node_id.clone(),
        });

        // The overall timeout is just another cancellation source: when it
        // fires before anything settles, it routes through the same
        // `cancel` path as an explicit caller cancel or a TTL sweep, which
        // is what gives every delegation exactly one of the three terminal
        // events required by spec §8.1 even on a natural timeout.
        let timeout_handle: JoinHandle<()> = {
            let this = self.clone();
            let id = req.delegation_id.clone();
            let overall_timeout = Duration::from_millis(req.timeout_ms);
            tokio::spawn(async move {
                tokio::time::sleep(overall_timeout).await;
                this.cancel(&id, "timeout").await;
            })
        };

        let fallback_count = req.fallback_node_ids.len();
        let mut candidates = Vec::new();

        let settled = match self.try_node(&req.to_node_id, &req, &cancel, fallback_count).await {
            TryOutcome::Completed(value) => Some(DelegationResult::completed(value)),
            TryOutcome::NotCompleted(outcome) => {
                candidates.push(outcome);
                let mut settled = None;
                for fallback_id in &req.fallback_node_ids {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if self.breaker_blocks(fallback_id) {
                        candidates
                            .push(CandidateOutcome::SkippedOpenCircuit { node_id: fallback_id.clone() });
                        continue;
                    }
                    match self.try_node(fallback_id, &req, &cancel, fallback_count).await {
                        TryOutcome::Completed(value) => {
                            settled = Some(DelegationResult::completed(value));
                            break;
                        }
                        TryOutcome::NotCompleted(outcome) => candidates.push(outcome),
                    }
                }
                settled
            }
        };

        timeout_handle.abort();

        match settled {
            Some(result) => {
                self.cleanup(&req.delegation_id);
                result
            }
            None if cancel.is_cancelled() => {
                // `cancel()` already emitted `cancelled` and tore the entry
                // down, whether it ran via an explicit call, a TTL sweep,
                // or the overall-timeout task above.
                self.cleanup(&req.delegation_id);
                DelegationResult::new(ResultStatus::Timeout)
            }
            None => {
                self.cleanup(&req.delegation_id);
                self.emitter.emit(Event::DelegationExhausted {
                    delegation_id: req.delegation_id.clone(),
                    candidates,
                });
                DelegationResult::new(ResultStatus::Failed)
            }
        }
    }

    /// spec §4.4.4. Registers the resolver *before* sending the wire frame
    /// (spec §5 ordering guarantee) so a racing reply can never be dropped.
    async fn try_node(
        &self,
        node_id: &NodeId,
        req: &DelegationRequest,
        cancel: &CancellationToken,
        fallback_count: usize,
    ) -> TryOutcome {
        if self.breaker_blocks(node_id) {
            return TryOutcome::NotCompleted(CandidateOutcome::SkippedOpenCircuit { node_id: node_id.clone() });
        }
        if cancel.is_cancelled() {
            return TryOutcome::NotCompleted(CandidateOutcome::Failed {
                node_id: node_id.clone(),
                reason: "aborted".to_string(),
            });
        }

        let reachable = matches!(self.registry.get(node_id), Some(node) if node.is_alive);
        if !reachable {
            self.record_failure(node_id);
            self.emitter.emit(Event::DelegationFailed {
                delegation_id: req.delegation_id.clone(),
                target: node_id.clone(),
                reason: "unreachable".to_string(),
            });
            return TryOutcome::NotCompleted(CandidateOutcome::Failed {
                node_id: node_id.clone(),
                reason: "unreachable".to_string(),
            });
        }

        let created_at_ms = match self.active.lock().get(&req.delegation_id) {
            Some(active) => active.created_at_ms,
            None => {
                return TryOutcome::NotCompleted(CandidateOutcome::Failed {
                    node_id: node_id.clone(),
                    reason: "aborted".to_string(),
                })
            }
        };
        let elapsed = self.clock.epoch_ms().saturating_sub(created_at_ms) as i64;
        let remaining = req.timeout_ms as i64 - elapsed;
        if remaining < self.config.min_node_timeout_ms as i64 {
            return TryOutcome::NotCompleted(CandidateOutcome::Failed {
                node_id: node_id.clone(),
                reason: "no_budget".to_string(),
            });
        }
        let remaining = remaining as u64;
        let even_share = remaining / (fallback_count as u64 + 1);
        let per_target = remaining.min(self.config.min_node_timeout_ms.max(even_share));

        if let Some(active) = self.active.lock().get_mut(&req.delegation_id) {
            active.current_node_id = node_id.clone();
        }

        let (tx, rx) = oneshot::channel();
        self.pending_resolvers.lock().insert(req.delegation_id.clone(), tx);

        self.sender
            .send_to_node(
                node_id,
                Frame::DelegationRequest {
                    delegation_id: req.delegation_id.clone(),
                    from_node_id: req.from_node_id.clone(),
                    to_node_id: node_id.clone(),
                    scope: None,
                    intent: req.intent.clone(),
                    payload: req.payload.clone(),
                    fallback_node_ids: vec![],
                    timeout_ms: per_target,
                },
            )
            .await;

        let arrived = tokio::select! {
            frame = rx => frame.ok(),
            _ = tokio::time::sleep(Duration::from_millis(per_target)) => None,
            _ = cancel.cancelled() => None,
        };
        self.pending_resolvers.lock().remove(&req.delegation_id);

        match arrived {
            Some(Frame::DelegationResult { status: FrameResultStatus::Completed, result, .. }) => {
                self.record_success(node_id);
                self.emitter.emit(Event::DelegationCompleted {
                    delegation_id: req.delegation_id.clone(),
                    node_id: node_id.clone(),
                });
                self.store_update(&req.delegation_id, DelegationStatus::Completed).await;
                TryOutcome::Completed(result)
            }
            Some(Frame::DelegationResult { status: FrameResultStatus::Refused, .. }) => {
                self.record_failure(node_id);
                self.emitter.emit(Event::DelegationFailed {
                    delegation_id: req.delegation_id.clone(),
                    target: node_id.clone(),
                    reason: "refused".to_string(),
                });
                self.store_update(&req.delegation_id, DelegationStatus::Refused).await;
                TryOutcome::NotCompleted(CandidateOutcome::Refused { node_id: node_id.clone() })
            }
            Some(Frame::DelegationResult { status: FrameResultStatus::Failed, .. }) => {
                self.record_failure(node_id);
                self.emitter.emit(Event::DelegationFailed {
                    delegation_id: req.delegation_id.clone(),
                    target: node_id.clone(),
                    reason: "failed".to_string(),
                });
                self.store_update(&req.delegation_id, DelegationStatus::Failed).await;
                TryOutcome::NotCompleted(CandidateOutcome::Failed {
                    node_id: node_id.clone(),
                    reason: "failed".to_string(),
                })
            }
            Some(other) => {
                warn!(kind = other.kind(), "unexpected frame delivered to a delegation resolver");
                self.record_failure(node_id);
                TryOutcome::NotCompleted(CandidateOutcome::Failed {
                    node_id: node_id.clone(),
                    reason: "malformed_result".to_string(),
                })
            }
            None => {
                self.record_failure(node_id);
                self.emitter.emit(Event::DelegationFailed {
                    delegation_id: req.delegation_id.clone(),
                    target: node_id.clone(),
                    reason: "timeout".to_string(),
                });
                TryOutcome::NotCompleted(CandidateOutcome::Failed {
                    node_id: node_id.clone(),
                    reason: "timeout".to_string(),
                })
            }
        }
    }

    /// spec §4.4.5.
    pub async fn handle_delegation_frame(&self, frame: Frame) {
        match frame {
            Frame::DelegationAccept { delegation_id, node_id } => {
                self.emitter.emit(Event::DelegationAccepted { delegation_id: delegation_id.clone(), node_id });
                self.store_update(&delegation_id, DelegationStatus::Accepted).await;
            }
            Frame::DelegationResult { ref delegation_id, .. } => {
                match self.pending_resolvers.lock().remove(delegation_id) {
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => {
                        self.unmatched_frame_count.fetch_add(1, Ordering::Relaxed);
                        debug!(delegation_id = %delegation_id, "dropped delegation.result with no pending resolver");
                    }
                }
            }
            other => {
                warn!(kind = other.kind(), "non-delegation frame routed to the delegation manager");
            }
        }
    }

    /// spec §4.4.6. Returns whether `delegation_id` was actually active;
    /// `false` means this was a no-op (already settled, already cancelled,
    /// or never existed). Callers that only cancel ids they already know to
    /// be active (the sweep, node cleanup, disposal, the overall-timeout
    /// task) can ignore it; `FrameRouter` uses it to distinguish a node
    /// cancelling its own delegation from one cancelling an unknown id.
    pub async fn cancel(&self, delegation_id: &DelegationId, reason: &str) -> bool {
        let Some(active) = self.active.lock().remove(delegation_id) else {
            return false;
        };
        active.cancel.cancel();
        {
            let mut counts = self.node_active_counts.lock();
            if let Some(count) = counts.get_mut(&active.from_node_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&active.from_node_id);
                }
            }
        }
        self.pending_resolvers.lock().remove(delegation_id);
        self.sender
            .send_to_node(
                &active.current_node_id,
                Frame::DelegationCancel { delegation_id: delegation_id.clone(), reason: reason.to_string() },
            )
            .await;
        self.emitter.emit(Event::DelegationCancelled {
            delegation_id: delegation_id.clone(),
            reason: reason.to_string(),
        });
        self.store_update(delegation_id, DelegationStatus::Cancelled).await;
        true
    }

    /// spec §4.4.7.
    pub async fn sweep(&self) {
        let now = self.clock.epoch_ms();
        let ttl = self.config.max_delegation_ttl_ms;
        let expired: Vec<DelegationId> = self
            .active
            .lock()
            .iter()
            .filter(|(_, active)| now.saturating_sub(active.created_at_ms) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.cancel(&id, "ttl_expired").await;
        }
    }

    /// spec §4.4.8, invoked from the Health Monitor's `node.dead` handler.
    pub async fn cleanup_node(&self, node_id: &NodeId) {
        let ids: Vec<DelegationId> = self
            .active
            .lock()
            .iter()
            .filter(|(_, active)| &active.from_node_id == node_id || &active.current_node_id == node_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.cancel(&id, &format!("node {node_id} disconnected")).await;
        }
    }

    pub fn start_sweep(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = Duration::from_millis(self.config.sweep_interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.sweep().await;
            }
        });
        *self.sweep_handle.lock() = Some(handle);
    }

    /// spec §4.4.9. Never panics: every collaborator call here is either
    /// infallible or already swallows its own errors.
    pub async fn dispose(&self) {
        if let Some(handle) = self.sweep_handle.lock().take() {
            handle.abort();
        }
        let ids: Vec<DelegationId> = self.active.lock().keys().cloned().collect();
        for id in ids {
            self.cancel(&id, "dispose").await;
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "manager_property_tests.rs"]
mod property_tests;
