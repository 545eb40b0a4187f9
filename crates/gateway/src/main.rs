// SPDX-License-Identifier: MIT

//! Binary entry point: a TCP listener accepting node connections, wiring
//! together the Node Registry, Health Monitor, Delegation Manager, and
//! frame router, with graceful shutdown on SIGINT/SIGTERM.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use templar_core::{NodeId, RegisteredNode, SystemClock};
use templar_gateway::{
    AllowAll, DelegationManager, DelegationManagerConfig, FrameRouter, GatewayConfig,
    HealthMonitor, NodeRegistry, NodeSender, NoopStore, TokenValidator,
};
use templar_wire::{decode, encode, read_message, write_message, Frame, ProtocolError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpListener, TcpStream,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Delivers frames to connected nodes over their owned TCP write half. One
/// channel per node so a slow/blocked write on one connection never stalls
/// another; see `templar_gateway::sender::NodeSender`.
struct TcpSender {
    channels: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Frame>>>,
}

impl TcpSender {
    fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    fn register(&self, node_id: NodeId, tx: mpsc::UnboundedSender<Frame>) {
        self.channels.lock().insert(node_id, tx);
    }

    fn remove(&self, node_id: &NodeId) {
        self.channels.lock().remove(node_id);
    }
}

#[async_trait]
impl NodeSender for TcpSender {
    async fn send_to_node(&self, node_id: &NodeId, frame: Frame) {
        let tx = self.channels.lock().get(node_id).cloned();
        match tx {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    warn!(node_id = %node_id, "dropped frame, connection writer already gone");
                }
            }
            None => warn!(node_id = %node_id, "dropped frame, no connection registered"),
        }
    }
}

async fn writer_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        let payload = match encode(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to encode outbound frame");
                continue;
            }
        };
        if let Err(err) = write_message(&mut write_half, &payload).await {
            warn!(error = %err, "write failed, closing connection");
            return;
        }
    }
}

async fn read_frame(reader: &mut BufReader<OwnedReadHalf>, max_frame_bytes: u32) -> Result<Frame, ProtocolError> {
    let bytes = read_message(reader, max_frame_bytes).await?;
    decode(&bytes)
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: NodeRegistry<SystemClock>,
    health: Arc<HealthMonitor<SystemClock>>,
    delegation: Arc<DelegationManager<SystemClock>>,
    sender: Arc<TcpSender>,
    validator: Arc<dyn TokenValidator>,
    max_frame_bytes: u32,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut auth_line = String::new();
    if reader.read_line(&mut auth_line).await.unwrap_or(0) == 0 {
        warn!(%addr, "connection closed before sending an authorization header");
        return;
    }
    let token = match templar_gateway::auth::parse_bearer(auth_line.trim_end()) {
        Some(token) => token.to_string(),
        None => {
            warn!(%addr, "missing or malformed authorization header");
            return;
        }
    };

    let frame = match read_frame(&mut reader, max_frame_bytes).await {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%addr, error = %err, "failed to read the registration frame");
            return;
        }
    };
    let (node_id, capabilities) = match frame {
        Frame::NodeRegister { node_id, capabilities } => (node_id, capabilities),
        other => {
            warn!(%addr, kind = other.kind(), "first frame on a connection must be node.register");
            return;
        }
    };

    if !validator.validate(node_id.as_str(), &token) {
        warn!(%addr, node_id = %node_id, "token rejected");
        return;
    }

    let router = FrameRouter::new(registry.clone(), health.clone(), delegation.clone());
    if let Err(err) = router.register_node(node_id.clone(), capabilities) {
        warn!(%addr, node_id = %node_id, error = %err, "registration rejected");
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    sender.register(node_id.clone(), tx.clone());
    let writer_handle = tokio::spawn(writer_loop(write_half, rx));
    let _ = tx.send(Frame::NodeRegisterAck { node_id: node_id.clone() });
    info!(node_id = %node_id, %addr, "node registered");

    loop {
        match read_frame(&mut reader, max_frame_bytes).await {
            Ok(frame) => {
                if let Err(err) = router.dispatch(&node_id, frame).await {
                    warn!(node_id = %node_id, error = %err, "frame dispatch failed");
                }
            }
            Err(err) => {
                info!(node_id = %node_id, error = %err, "connection closed");
                break;
            }
        }
    }

    sender.remove(&node_id);
    router.handle_disconnect(&node_id).await;
    drop(tx);
    writer_handle.abort();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match std::env::var("TEMPLAR_GATEWAY_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)?;
            GatewayConfig::from_toml_str(&text)?
        }
        Err(_) => GatewayConfig::default(),
    };

    let clock = SystemClock;
    let registry = NodeRegistry::new(clock.clone());
    let sender = Arc::new(TcpSender::new());
    let health = Arc::new(HealthMonitor::new(
        clock.clone(),
        registry.clone(),
        sender.clone() as Arc<dyn NodeSender>,
        std::time::Duration::from_millis(config.sweep_interval_ms),
    ));
    let delegation = Arc::new(DelegationManager::new(
        clock,
        registry.clone(),
        sender.clone() as Arc<dyn NodeSender>,
        Arc::new(NoopStore),
        DelegationManagerConfig::from(&config),
    ));
    let validator: Arc<dyn TokenValidator> = Arc::new(AllowAll);

    health.start();
    delegation.start_sweep();

    let listener = TcpListener::bind(config.bind_addr.as_str()).await?;
    info!(addr = %config.bind_addr, "templar gateway listening");

    let mut dead_rx = health.on_node_dead();
    let delegation_for_sweep = delegation.clone();
    tokio::spawn(async move {
        while let Ok(node) = dead_rx.recv().await {
            let node: RegisteredNode = node;
            delegation_for_sweep.cleanup_node(&node.node_id).await;
        }
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    registry.clone(),
                    health.clone(),
                    delegation.clone(),
                    sender.clone(),
                    validator.clone(),
                    config.max_frame_bytes,
                ));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    health.stop();
    delegation.dispose().await;
    Ok(())
}
