// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema configuration.
//!
//! One YAML document enumerates the nodes (with transports and heartbeat
//! periods) and the bundles (with producers, consumers, and signal lists).
//! The same document drives the offline code generator; the runtime loads
//! it at startup for schema lookup.
//!
//! # Example
//!
//! ```yaml
//! nodes:
//!   - name: mcu
//!     transport:
//!       type: serial
//!       device: /dev/ttyUSB0
//!     heartbeat: { enabled: true, period_ms: 500 }
//!   - name: pc
//!     transport:
//!       type: udp4
//!       ip: 192.168.131.1
//!       port: 11075
//! bundles:
//!   - name: status
//!     id: 0x100
//!     producer: mcu
//!     consumer: pc
//!     signals:
//!       - name: voltage
//!         type: float
//!       - name: firmware
//!         type: string
//!         value: "2.1.0"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::signal::{SignalKind, SignalSpec};

/// Baud rate used when the schema does not give one.
const DEFAULT_BAUD: u32 = 1_152_000;

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

/// The parsed schema document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
}

/// One node entry: identity, transport endpoint, optional heartbeating.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatConfig>,
}

/// Transport endpoint of a node.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Datagram endpoint: bind/send address of this node.
    Udp4 { ip: String, port: u16 },
    /// Byte-stream endpoint: tty device, raw 8N1 no flow control.
    Serial {
        device: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
}

/// Heartbeat emission settings of a node.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub period_ms: u64,
}

/// One bundle entry of the schema.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleConfig {
    pub name: String,
    /// Globally unique within this configuration; 0 is reserved.
    pub id: u32,
    pub producer: String,
    pub consumer: String,
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
}

/// One signal entry of a bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Element count, required for `list_*` types.
    #[serde(default)]
    pub length: Option<u32>,
    /// Maximum byte length, required for string/bytes kinds unless
    /// derivable from a default literal.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Default literal; its presence makes the signal constant.
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
}

impl SignalConfig {
    /// A bare scalar signal record (used for runtime-built bundles such as
    /// heartbeats and test fixtures).
    #[must_use]
    pub fn scalar(name: &str, kind: SignalKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            length: None,
            capacity: None,
            value: None,
        }
    }

    /// Resolve this record into a [`SignalSpec`] at position `index` of
    /// bundle `bundle`, deriving length/capacity from the default literal
    /// where the schema omits them.
    pub fn resolve(&self, bundle: &str, index: usize) -> Result<SignalSpec> {
        let length = if self.kind.is_list() {
            match self.length.or_else(|| self.literal_len()) {
                Some(len) if len > 0 => len,
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "signal '{}' of type {} needs a length",
                        self.name, self.kind
                    )))
                }
            }
        } else {
            0
        };

        let capacity = if self.kind.has_capacity() {
            match self.capacity.or_else(|| self.literal_capacity()) {
                Some(cap) => cap,
                None => {
                    return Err(Error::InvalidConfig(format!(
                        "signal '{}' of type {} needs a capacity",
                        self.name, self.kind
                    )))
                }
            }
        } else {
            0
        };

        Ok(SignalSpec {
            name: self.name.clone(),
            bundle: bundle.to_owned(),
            kind: self.kind,
            length,
            capacity,
            is_const: self.value.is_some(),
            index,
        })
    }

    /// Element count implied by a sequence literal.
    fn literal_len(&self) -> Option<u32> {
        let seq = self.value.as_ref()?.as_sequence()?;
        u32::try_from(seq.len()).ok()
    }

    /// Byte capacity implied by a literal: the string length, the byte
    /// count, or the longest element of a list literal.
    fn literal_capacity(&self) -> Option<u32> {
        let literal = self.value.as_ref()?;
        let cap = match self.kind {
            SignalKind::String => literal.as_str()?.len(),
            SignalKind::Bytes => literal.as_sequence()?.len(),
            SignalKind::ListString => literal
                .as_sequence()?
                .iter()
                .map(|v| v.as_str().map_or(0, str::len))
                .max()
                .unwrap_or(0),
            SignalKind::ListBytes => literal
                .as_sequence()?
                .iter()
                .map(|v| v.as_sequence().map_or(0, Vec::len))
                .max()
                .unwrap_or(0),
            _ => return None,
        };
        u32::try_from(cap).ok()
    }
}

impl Config {
    /// Load and validate a schema document from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::ConfigRead)?;
        Self::from_str(&contents)
    }

    /// Parse and validate a schema document.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration entry of a node.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Every configured node other than `name`.
    #[must_use]
    pub fn peers_of(&self, name: &str) -> Vec<&NodeConfig> {
        self.nodes.iter().filter(|n| n.name != name).collect()
    }

    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("no nodes configured".into()));
        }

        let mut node_names = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(Error::InvalidConfig("node with empty name".into()));
            }
            if !node_names.insert(node.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
            if let Some(hb) = node.heartbeat {
                if hb.enabled && hb.period_ms == 0 {
                    return Err(Error::InvalidConfig(format!(
                        "node '{}' enables heartbeat with period 0",
                        node.name
                    )));
                }
            }
        }

        let mut bundle_names = HashSet::new();
        let mut bundle_ids = HashSet::new();
        for bundle in &self.bundles {
            if bundle.id == crate::HEARTBEAT_ID {
                return Err(Error::InvalidConfig(format!(
                    "bundle '{}' uses reserved id 0",
                    bundle.name
                )));
            }
            if !bundle_names.insert(bundle.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate bundle name '{}'",
                    bundle.name
                )));
            }
            if !bundle_ids.insert(bundle.id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate bundle id 0x{:x}",
                    bundle.id
                )));
            }
            for role in [&bundle.producer, &bundle.consumer] {
                if !node_names.contains(role.as_str()) {
                    return Err(Error::InvalidConfig(format!(
                        "bundle '{}' references unknown node '{}'",
                        bundle.name, role
                    )));
                }
            }
            // Surface signal schema problems at load time instead of at
            // bundle construction.
            for (index, signal) in bundle.signals.iter().enumerate() {
                signal.resolve(&bundle.name, index)?;
            }
        }

        Ok(())
    }
}

// ===== Tests =====
