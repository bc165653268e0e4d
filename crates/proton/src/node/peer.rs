// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer state: identity, transport, read buffer, and heartbeat
//! liveness tracking.

use std::time::{Duration, Instant};

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use crate::config::HeartbeatConfig;
use crate::node::NodeState;
use crate::transport::Transport;

/// A remote node known to the local node.
///
/// The peer owns its transport and its read buffer. It starts INACTIVE and
/// is promoted ACTIVE by heartbeat receipt; the liveness tick demotes it
/// back once heartbeats stop arriving for longer than the peer's period.
pub struct Peer {
    name: String,
    id: u64,
    state: AtomicCell<NodeState>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) read_buf: Mutex<Vec<u8>>,
    heartbeat: Option<HeartbeatConfig>,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl Peer {
    pub(crate) fn new(
        name: &str,
        id: u64,
        transport: Box<dyn Transport>,
        heartbeat: Option<HeartbeatConfig>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            id,
            state: AtomicCell::new(NodeState::Inactive),
            transport,
            read_buf: Mutex::new(vec![0u8; crate::MAX_MESSAGE_SIZE]),
            heartbeat,
            last_heartbeat: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state.load()
    }

    /// The peer's transport (shared by the spin and send paths).
    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Heartbeat settings this peer announced in the schema, if enabled.
    #[must_use]
    pub fn heartbeat(&self) -> Option<HeartbeatConfig> {
        self.heartbeat.filter(|hb| hb.enabled)
    }

    /// Monotonic time of the most recent heartbeat from this peer.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<Instant> {
        *self.last_heartbeat.lock()
    }

    /// Stamp a received heartbeat and promote the peer to ACTIVE.
    pub(crate) fn mark_heartbeat(&self) {
        *self.last_heartbeat.lock() = Some(Instant::now());
        self.state.store(NodeState::Active);
    }

    /// Demote an ACTIVE peer whose heartbeat gap exceeds its period.
    /// Returns true when a demotion happened on this tick.
    pub(crate) fn check_liveness(&self) -> bool {
        let Some(hb) = self.heartbeat() else {
            return false;
        };
        if self.state.load() != NodeState::Active {
            return false;
        }
        let expired = match *self.last_heartbeat.lock() {
            Some(stamp) => stamp.elapsed() > Duration::from_millis(hb.period_ms),
            None => true,
        };
        if expired {
            self.state.store(NodeState::Inactive);
        }
        expired
    }
}

// ===== Tests =====
