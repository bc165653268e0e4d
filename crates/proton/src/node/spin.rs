// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The per-peer spin loop and the periodic runtime threads.
//!
//! `spin_once` executes one step of the transport state machine:
//! reconnect when disconnected, recover when errored, otherwise
//! read-decode-dispatch under the peer's read-buffer lock. Callbacks run on
//! the spin thread, in arrival order per peer, while that lock is held.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::{Node, NodeState, Peer};
use crate::transport::TransportState;

/// Pause between spin steps after a reported error, so a dead link does
/// not turn reconnection into a busy loop.
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Liveness and rate-sampling cadence.
const TICK_PERIOD: Duration = Duration::from_secs(1);

impl Node {
    /// Drive one peer's state machine forever.
    ///
    /// Errors inside a step are reported and absorbed; the loop recovers
    /// through the transport's disconnect/reconnect transitions. Returns
    /// when the node leaves the ACTIVE state or is shut down.
    pub fn spin(&self, peer_index: usize) -> Result<()> {
        loop {
            if !self.is_running() {
                return Ok(());
            }
            match self.spin_once(peer_index) {
                Ok(()) => {}
                Err(e @ (Error::InvalidState(_) | Error::UnknownPeer(_))) => return Err(e),
                Err(e) => {
                    log::warn!("[SPIN] peer {}: {}", peer_index, e);
                    std::thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    /// Execute one step of the spin state machine for one peer.
    pub fn spin_once(&self, peer_index: usize) -> Result<()> {
        if self.state() != NodeState::Active {
            return Err(Error::InvalidState(format!(
                "spin called in state {}",
                self.state()
            )));
        }
        let peer = self
            .peers()
            .get(peer_index)
            .cloned()
            .ok_or_else(|| Error::UnknownPeer(format!("peer index {}", peer_index)))?;

        match peer.transport().state() {
            TransportState::Disconnected => match peer.transport().connect() {
                Ok(()) => {
                    peer.transport().set_state(TransportState::Connected);
                    log::debug!("[SPIN] {} connected", peer.name());
                    Ok(())
                }
                Err(e) => {
                    peer.transport().set_state(TransportState::Error);
                    Err(e)
                }
            },
            TransportState::Error => {
                peer.transport().disconnect()?;
                peer.transport().set_state(TransportState::Disconnected);
                // The local heartbeat counter restarts with the link.
                self.reset_heartbeat_counter();
                Ok(())
            }
            TransportState::Connected => self.poll_bundle(&peer),
        }
    }

    /// Read-decode-dispatch under the peer's read-buffer lock.
    fn poll_bundle(&self, peer: &Arc<Peer>) -> Result<()> {
        let transport = peer.transport();
        let mut buf = peer.read_buf.lock();

        let bytes_read = match transport.read(&mut buf) {
            Ok(0) | Err(Error::WouldBlock) => return Ok(()),
            Ok(n) => n,
            // Framing errors discard the frame; the link stays up.
            Err(e @ (Error::InvalidHeader | Error::Crc16Mismatch { .. })) => {
                log::debug!("[SPIN] {}: frame dropped: {}", peer.name(), e);
                return Err(e);
            }
            Err(e) => {
                transport.set_state(TransportState::Error);
                log::warn!("[SPIN] {}: transport error: {}", peer.name(), e);
                return Err(e);
            }
        };

        self.count_rx_bytes(bytes_read + transport.frame_overhead());
        match self.manager().receive(&buf[..bytes_read], peer.name()) {
            Ok(handle) => {
                handle.mark_received();
                if handle.id() == crate::HEARTBEAT_ID {
                    peer.mark_heartbeat();
                }
                handle.notify();
                Ok(())
            }
            Err(e) => {
                // A bad bundle affects neither other bundles nor the link.
                log::debug!("[SPIN] {}: bundle dropped: {}", peer.name(), e);
                Err(e)
            }
        }
    }

    fn reset_heartbeat_counter(&self) {
        if let Ok(handle) = self.manager().heartbeat(self.name()) {
            if let Ok(signal) = handle.signal("heartbeat") {
                let _ = signal.set(0u32);
            }
        }
    }

    // ===== Background threads =====

    pub(crate) fn run_spin_thread(&self, peer_index: usize) {
        if let Err(e) = self.spin(peer_index) {
            log::warn!("[SPIN] peer {} stopped: {}", peer_index, e);
        }
    }

    pub(crate) fn run_heartbeat_thread(&self, period: Duration) {
        while self.is_running() {
            if let Err(e) = self.send_heartbeat() {
                log::debug!("[HB] {}: {}", self.name(), e);
            }
            std::thread::sleep(period);
        }
    }

    /// 1 Hz housekeeping: demote silent peers, sample throughput rates.
    pub(crate) fn run_ticker_thread(&self) {
        while self.is_running() {
            std::thread::sleep(TICK_PERIOD);
            if !self.is_running() {
                return;
            }
            self.liveness_tick();
            self.sample_rates();
        }
    }

    /// Demote peers whose heartbeat gap exceeds their period.
    ///
    /// The ticker thread runs this at 1 Hz; it is also callable from any
    /// user-level periodic thread that integrates its own liveness cadence.
    pub fn liveness_tick(&self) {
        for peer in self.peers() {
            if peer.check_liveness() {
                log::info!("[HB] peer {} inactive (heartbeat timeout)", peer.name());
            }
        }
    }
}

// ===== Tests =====
