// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The local node: lifecycle, send paths, callback registration, and
//! runtime statistics.
//!
//! A node is created UNCONFIGURED over a schema document, `configure`d into
//! INACTIVE (bundle manager populated, peers and transports instantiated),
//! and `activate`d into ACTIVE (spin, heartbeat, and liveness threads
//! started). ACTIVE is terminal; `shutdown` drains the threads for process
//! exit and tests but performs no lifecycle transition.

mod peer;
mod spin;

pub use peer::Peer;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use parking_lot::{Mutex, RwLock};

use crate::bundle::{BundleHandle, BundleManager};
use crate::config::{Config, NodeConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::transport::{SerialTransport, Transport, TransportState, Udp4Transport};

/// Lifecycle state of a node (and of each peer, as seen locally).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unconfigured,
    Inactive,
    Active,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Unconfigured => f.write_str("Unconfigured"),
            NodeState::Inactive => f.write_str("Inactive"),
            NodeState::Active => f.write_str("Active"),
        }
    }
}

/// The local identity of a Proton process.
pub struct Node {
    name: String,
    state: AtomicCell<NodeState>,
    config: Config,
    manager: BundleManager,
    peers: RwLock<Vec<Arc<Peer>>>,
    write_buf: Mutex<Vec<u8>>,
    running: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_kbps: AtomicCell<f64>,
    tx_kbps: AtomicCell<f64>,
}

impl Node {
    /// Create an unconfigured node named `name` over a parsed schema.
    #[must_use]
    pub fn new(config: Config, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: AtomicCell::new(NodeState::Unconfigured),
            config,
            manager: BundleManager::new(),
            peers: RwLock::new(Vec::new()),
            write_buf: Mutex::new(Vec::with_capacity(crate::MAX_MESSAGE_SIZE)),
            running: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            rx_kbps: AtomicCell::new(0.0),
            tx_kbps: AtomicCell::new(0.0),
        }
    }

    /// Load a schema file and create an unconfigured node from it.
    pub fn from_config_file<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        Ok(Self::new(Config::from_file(path)?, name))
    }

    // ===== Lifecycle =====

    /// Populate the bundle manager from the schema, instantiate the peer
    /// list with their transports, and register heartbeat bundles.
    ///
    /// Requires UNCONFIGURED; transitions to INACTIVE.
    pub fn configure(&self) -> Result<()> {
        let state = self.state.load();
        if state != NodeState::Unconfigured {
            return Err(Error::InvalidStateTransition(format!(
                "configure called in state {}",
                state
            )));
        }

        let local = self
            .config
            .node(&self.name)
            .cloned()
            .ok_or_else(|| Error::InvalidConfig(format!("node '{}' not in schema", self.name)))?;

        for bundle in &self.config.bundles {
            self.manager.add_bundle(bundle)?;
        }

        let peer_configs: Vec<NodeConfig> =
            self.config.peers_of(&self.name).into_iter().cloned().collect();
        let mut peers = Vec::with_capacity(peer_configs.len());
        for (index, peer_config) in peer_configs.iter().enumerate() {
            let transport = build_transport(&local, peer_config)?;
            peers.push(Arc::new(Peer::new(
                &peer_config.name,
                index as u64,
                transport,
                peer_config.heartbeat,
            )));
        }

        if local.heartbeat.is_some_and(|hb| hb.enabled) {
            // One produced-heartbeat handle per node; with several peers it
            // is broadcast and the consumer field is left open.
            let consumer = match peers.as_slice() {
                [only] => only.name().to_owned(),
                _ => String::new(),
            };
            self.manager.add_heartbeat(&self.name, &consumer);
        }
        for peer_config in &peer_configs {
            if peer_config.heartbeat.is_some_and(|hb| hb.enabled) {
                self.manager.add_heartbeat(&peer_config.name, &self.name);
            }
        }

        log::info!(
            "[NODE] {} configured: {} bundles, {} peers",
            self.name,
            self.config.bundles.len(),
            peers.len()
        );
        *self.peers.write() = peers;
        self.state.store(NodeState::Inactive);
        Ok(())
    }

    /// Start the spin, heartbeat, and liveness threads.
    ///
    /// Requires INACTIVE; transitions to ACTIVE. A second call is a hard
    /// [`Error::InvalidStateTransition`].
    pub fn activate(self: &Arc<Self>) -> Result<()> {
        let state = self.state.load();
        if state != NodeState::Inactive {
            return Err(Error::InvalidStateTransition(format!(
                "activate called in state {}",
                state
            )));
        }

        self.running.store(true, Ordering::SeqCst);
        self.state.store(NodeState::Active);

        let peers = self.peers();
        let mut threads = self.threads.lock();
        for (index, peer) in peers.iter().enumerate() {
            threads.push(spawn_thread(
                format!("proton-spin-{}", peer.name()),
                Arc::clone(self),
                move |node| node.run_spin_thread(index),
            )?);
        }

        if let Some(hb) = self.local_heartbeat() {
            let period = Duration::from_millis(hb.period_ms);
            threads.push(spawn_thread(
                "proton-heartbeat".to_owned(),
                Arc::clone(self),
                move |node| node.run_heartbeat_thread(period),
            )?);
        }

        threads.push(spawn_thread(
            "proton-ticker".to_owned(),
            Arc::clone(self),
            |node| node.run_ticker_thread(),
        )?);

        log::info!("[NODE] {} active", self.name);
        Ok(())
    }

    /// Stop the background threads, disconnect every peer transport, and
    /// join. Safe to call more than once.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        for peer in self.peers.read().iter() {
            let transport = peer.transport();
            if let Err(e) = transport.disconnect() {
                log::warn!("[NODE] {}: disconnect {}: {}", self.name, peer.name(), e);
            }
            transport.set_state(TransportState::Disconnected);
        }
        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for thread in threads {
            let _ = thread.join();
        }
        log::info!("[NODE] {} shut down", self.name);
    }

    // ===== Send paths =====

    /// Serialize the named bundle and write it to its peer.
    pub fn send_bundle(&self, name: &str) -> Result<()> {
        let handle = self.manager.bundle(name)?;
        self.send(&handle)
    }

    /// Serialize a bundle handle and write it to its peer.
    ///
    /// Routing: the peer named by the bundle's consumer; the producer's
    /// peer when the local node is itself the consumer; every connected
    /// peer for heartbeats. Fails [`Error::InvalidState`] when the node is
    /// not ACTIVE or no routed peer is connected.
    pub fn send(&self, handle: &BundleHandle) -> Result<()> {
        let state = self.state.load();
        if state != NodeState::Active {
            return Err(Error::InvalidState(format!(
                "send_bundle called in state {}",
                state
            )));
        }

        let targets = self.route(handle)?;
        let mut buf = self.write_buf.lock();
        handle.encode_into(&mut buf)?;

        let mut delivered = false;
        for peer in &targets {
            let transport = peer.transport();
            if transport.state() != TransportState::Connected {
                continue;
            }
            let sent = transport.write(&buf)?;
            self.tx_bytes
                .fetch_add((sent + transport.frame_overhead()) as u64, Ordering::Relaxed);
            delivered = true;
        }
        drop(buf);

        if !delivered {
            return Err(Error::InvalidState(format!(
                "no connected peer for bundle '{}'",
                handle.name()
            )));
        }
        handle.mark_sent();
        Ok(())
    }

    /// Increment the local heartbeat counter and send the heartbeat bundle.
    ///
    /// Called by the heartbeat thread each period; also available to nodes
    /// driving their own timing.
    pub fn send_heartbeat(&self) -> Result<()> {
        let handle = self.manager.heartbeat(&self.name)?;
        let signal = handle.signal("heartbeat")?;
        let count = signal.get::<u32>()?;
        signal.set(count.wrapping_add(1))?;
        self.send(&handle)
    }

    fn route(&self, handle: &BundleHandle) -> Result<Vec<Arc<Peer>>> {
        let peers = self.peers.read();
        if handle.id() == crate::HEARTBEAT_ID {
            return Ok(peers.clone());
        }
        for role in [handle.consumer(), handle.producer()] {
            if let Some(peer) = peers.iter().find(|p| p.name() == role) {
                return Ok(vec![Arc::clone(peer)]);
            }
        }
        Err(Error::UnknownPeer(format!(
            "bundle '{}' routes to no configured peer",
            handle.name()
        )))
    }

    // ===== Callback registration =====

    /// Store a callback on the named bundle; refused unless this node is
    /// the bundle's consumer.
    pub fn register_callback<F>(&self, bundle_name: &str, callback: F) -> Result<()>
    where
        F: Fn(&BundleHandle) + Send + Sync + 'static,
    {
        let handle = self.manager.bundle(bundle_name)?;
        self.register_on(&handle, callback)
    }

    /// Store a callback on the heartbeat bundle of `producer`.
    pub fn register_heartbeat_callback<F>(&self, producer: &str, callback: F) -> Result<()>
    where
        F: Fn(&BundleHandle) + Send + Sync + 'static,
    {
        let handle = self.manager.heartbeat(producer)?;
        self.register_on(&handle, callback)
    }

    fn register_on<F>(&self, handle: &BundleHandle, callback: F) -> Result<()>
    where
        F: Fn(&BundleHandle) + Send + Sync + 'static,
    {
        if handle.consumer() != self.name {
            return Err(Error::NotConsumer {
                bundle: handle.name().to_owned(),
                node: self.name.clone(),
            });
        }
        handle.register_callback(callback);
        Ok(())
    }

    // ===== Accessors =====

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state.load()
    }

    /// The bundle registry of this node.
    #[must_use]
    pub fn manager(&self) -> &BundleManager {
        &self.manager
    }

    /// Look up a bundle handle by name (shorthand for the manager call).
    pub fn bundle(&self, name: &str) -> Result<Arc<BundleHandle>> {
        self.manager.bundle(name)
    }

    /// Snapshot of the configured peers.
    #[must_use]
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().clone()
    }

    fn local_heartbeat(&self) -> Option<crate::config::HeartbeatConfig> {
        self.config
            .node(&self.name)
            .and_then(|n| n.heartbeat)
            .filter(|hb| hb.enabled)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runtime statistics snapshot for telemetry and display.
    #[must_use]
    pub fn stats(&self) -> NodeStats {
        let peers = self
            .peers
            .read()
            .iter()
            .map(|p| PeerStats {
                name: p.name().to_owned(),
                state: p.state(),
                transport: p.transport().state(),
            })
            .collect();
        let bundle_stats = |handle: &Arc<BundleHandle>| BundleStats {
            name: handle.name().to_owned(),
            producer: handle.producer().to_owned(),
            consumer: handle.consumer().to_owned(),
            txps: handle.txps(),
            rxps: handle.rxps(),
        };
        NodeStats {
            name: self.name.clone(),
            state: self.state.load(),
            rx_kbps: self.rx_kbps.load(),
            tx_kbps: self.tx_kbps.load(),
            peers,
            bundles: self.manager.bundles().iter().map(bundle_stats).collect(),
            heartbeats: self.manager.heartbeats().iter().map(bundle_stats).collect(),
        }
    }

    pub(crate) fn count_rx_bytes(&self, bytes: usize) {
        self.rx_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// 1 Hz sampler: fold the byte counters into KB/s and snapshot the
    /// per-bundle rates.
    pub(crate) fn sample_rates(&self) {
        self.rx_kbps
            .store(self.rx_bytes.swap(0, Ordering::Relaxed) as f64 / 1000.0);
        self.tx_kbps
            .store(self.tx_bytes.swap(0, Ordering::Relaxed) as f64 / 1000.0);
        for handle in self.manager.bundles() {
            handle.sample_rates();
        }
        for handle in self.manager.heartbeats() {
            handle.sample_rates();
        }
    }
}

/// Pick and build the transport for the link between the local node and one
/// peer. Serial links use the local node's device; mixed udp4/serial pairs
/// are a schema error.
fn build_transport(local: &NodeConfig, peer: &NodeConfig) -> Result<Box<dyn Transport>> {
    match (&local.transport, &peer.transport) {
        (
            TransportConfig::Udp4 {
                ip: local_ip,
                port: local_port,
            },
            TransportConfig::Udp4 {
                ip: peer_ip,
                port: peer_port,
            },
        ) => Ok(Box::new(Udp4Transport::from_endpoints(
            local_ip,
            *local_port,
            peer_ip,
            *peer_port,
        )?)),
        (TransportConfig::Serial { device, baud }, TransportConfig::Serial { .. }) => {
            Ok(Box::new(SerialTransport::new(device, *baud)))
        }
        _ => Err(Error::InvalidConfig(format!(
            "transport mismatch between '{}' and '{}'",
            local.name, peer.name
        ))),
    }
}

fn spawn_thread<F>(name: String, node: Arc<Node>, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce(&Node) + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || body(&node))
        .map_err(|e| Error::InvalidState(format!("failed to spawn {}: {}", name, e)))
}

/// Snapshot of a node's runtime statistics.
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub name: String,
    pub state: NodeState,
    pub rx_kbps: f64,
    pub tx_kbps: f64,
    pub peers: Vec<PeerStats>,
    pub bundles: Vec<BundleStats>,
    pub heartbeats: Vec<BundleStats>,
}

/// Per-peer slice of [`NodeStats`].
#[derive(Debug, Clone)]
pub struct PeerStats {
    pub name: String,
    pub state: NodeState,
    pub transport: TransportState,
}

/// Per-bundle slice of [`NodeStats`].
#[derive(Debug, Clone)]
pub struct BundleStats {
    pub name: String,
    pub producer: String,
    pub consumer: String,
    pub txps: u64,
    pub rxps: u64,
}
