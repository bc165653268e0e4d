// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Proton - typed bundle messaging for heterogeneous links
//!
//! A point-to-multipoint messaging runtime: named nodes publish and
//! subscribe to strongly-typed *bundles* of *signals* over UDP sockets and
//! framed serial links, with heartbeat-based peer liveness.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use proton::{Node, Result};
//!
//! fn main() -> Result<()> {
//!     let node = Arc::new(Node::from_config_file("robot.yaml", "pc")?);
//!     node.configure()?;
//!
//!     // Deliver incoming bundles to a callback
//!     node.register_callback("status", |bundle| {
//!         let voltage = bundle.signal("voltage").and_then(|s| s.get::<f32>());
//!         println!("voltage: {:?}", voltage);
//!     })?;
//!
//!     node.activate()?;
//!
//!     // Publish
//!     let cmd = node.bundle("cmd_vel")?;
//!     cmd.signal("velocities")?.set(vec![0.5f64, 0.0])?;
//!     node.send_bundle("cmd_vel")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                        Application Layer                         |
//! |    callbacks <- BundleHandle/SignalHandle -> send_bundle         |
//! +------------------------------------------------------------------+
//! |                          Node Layer                              |
//! |    lifecycle (configure/activate) | peers | heartbeat liveness   |
//! +------------------------------------------------------------------+
//! |                         Bundle Layer                             |
//! |    BundleManager: id/name dispatch | protobuf wire codec         |
//! +------------------------------------------------------------------+
//! |                        Transport Layer                           |
//! |    UDP4 datagrams | serial frames (magic + len + CRC-16)         |
//! +------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | The local identity: lifecycle, peers, send paths |
//! | [`BundleHandle`] | Schema-bound accessor over one wire-format bundle |
//! | [`SignalHandle`] | Typed, bounds-checked get/set on one signal |
//! | [`BundleManager`] | Name/id lookup and parse-and-dispatch |
//! | [`Transport`] | Uniform link interface (UDP4, serial) |
//! | [`Config`] | The YAML schema document |
//!
//! Bundles are self-describing by id only; both ends must hold the same
//! schema. Delivery is best-effort with no acknowledgement or ordering
//! beyond what the underlying link provides.

/// Bundle handles and the bundle manager.
pub mod bundle;
/// YAML schema configuration.
pub mod config;
/// Error and result types.
pub mod error;
/// Serial frame codec (magic bytes, length, CRC-16/XMODEM).
pub mod frame;
/// Node lifecycle, peers, spin and heartbeat loops.
pub mod node;
/// Signal kinds, schema records, and typed value traits.
pub mod signal;
/// Transport trait and the UDP4/serial implementations.
pub mod transport;
/// Protocol Buffers wire messages.
pub mod wire;

pub use bundle::{BundleCallback, BundleHandle, BundleManager, SignalHandle};
pub use config::{
    BundleConfig, Config, HeartbeatConfig, NodeConfig, SignalConfig, TransportConfig,
};
pub use error::{Error, Result};
pub use node::{BundleStats, Node, NodeState, NodeStats, Peer, PeerStats};
pub use signal::{SignalElement, SignalKind, SignalSpec, SignalValue};
pub use transport::{SerialTransport, Transport, TransportState, Udp4Transport};

/// Largest serialized bundle the runtime moves: one unfragmented message
/// per datagram or frame.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Bundle id reserved for heartbeats.
pub const HEARTBEAT_ID: u32 = 0;
