// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by Proton operations.

use crate::signal::SignalKind;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by Proton node, bundle, and transport operations.
///
/// Lifecycle errors (`InvalidState*`) are surfaced to the caller with no
/// state change. Transport errors drive the spin state machine; framing
/// errors discard the offending frame and let the reader continue.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Schema document is malformed or fails validation.
    InvalidConfig(String),
    /// Configuration file could not be read.
    ConfigRead(std::io::Error),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Operation refused in the current node or transport state.
    InvalidState(String),
    /// Lifecycle API called in the wrong state (e.g. double activate).
    InvalidStateTransition(String),

    // ========================================================================
    // Schema Lookup Errors
    // ========================================================================
    /// No bundle with this name in the loaded schema.
    UnknownBundle(String),
    /// No signal with this name in the bundle.
    UnknownSignal { bundle: String, signal: String },
    /// No peer with this name (or index) on the node.
    UnknownPeer(String),
    /// Callback registration refused: the node is not the bundle's consumer.
    NotConsumer { bundle: String, node: String },

    // ========================================================================
    // Signal Handle Errors
    // ========================================================================
    /// Requested value type does not match the signal's variant tag.
    WrongType { signal: String, requested: SignalKind },
    /// List element index past the declared length.
    OutOfRange { signal: String, index: usize, length: u32 },
    /// List assignment with an element count other than the declared length.
    WrongLength { signal: String, expected: u32, actual: usize },
    /// String/bytes value longer than the declared capacity.
    CapacityExceeded { signal: String, capacity: u32, actual: usize },
    /// Set refused on a constant signal.
    ConstSignal(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport open failed.
    ConnectError(String),
    /// Transport close failed.
    DisconnectError(String),
    /// Transport read failed (short read, EOF, device gone).
    ReadError(String),
    /// Transport write failed (short write, device gone).
    WriteError(String),
    /// Non-blocking read had no data; retry on the next spin tick.
    WouldBlock,

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Framed read saw bad magic bytes or a zero payload length.
    InvalidHeader,
    /// Framed payload failed the CRC-16 check.
    Crc16Mismatch { expected: u16, actual: u16 },
    /// Payload exceeds the receive buffer or the maximum frame size.
    InsufficientBuffer { needed: usize, capacity: usize },

    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// Protobuf encode failed.
    Encode(String),
    /// Protobuf decode failed (malformed message or heartbeat shape).
    Decode(String),
    /// Decoded bundle id is not registered in the schema.
    UnknownBundleId(u32),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Configuration
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ConfigRead(e) => write!(f, "Failed to read configuration: {}", e),
            // Lifecycle
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::InvalidStateTransition(msg) => {
                write!(f, "Invalid state transition: {}", msg)
            }
            // Schema lookup
            Error::UnknownBundle(name) => write!(f, "Unknown bundle '{}'", name),
            Error::UnknownSignal { bundle, signal } => {
                write!(f, "Unknown signal '{}' in bundle '{}'", signal, bundle)
            }
            Error::UnknownPeer(name) => write!(f, "Unknown peer '{}'", name),
            Error::NotConsumer { bundle, node } => {
                write!(f, "Node '{}' is not the consumer of bundle '{}'", node, bundle)
            }
            // Signal handle
            Error::WrongType { signal, requested } => {
                write!(f, "Signal '{}' is not of type {}", signal, requested)
            }
            Error::OutOfRange {
                signal,
                index,
                length,
            } => write!(
                f,
                "Index {} out of range for signal '{}' (length {})",
                index, signal, length
            ),
            Error::WrongLength {
                signal,
                expected,
                actual,
            } => write!(
                f,
                "Signal '{}' takes exactly {} elements (got {})",
                signal, expected, actual
            ),
            Error::CapacityExceeded {
                signal,
                capacity,
                actual,
            } => write!(
                f,
                "Value of {} bytes exceeds capacity {} of signal '{}'",
                actual, capacity, signal
            ),
            Error::ConstSignal(name) => write!(f, "Signal '{}' is constant", name),
            // Transport
            Error::ConnectError(msg) => write!(f, "Connect error: {}", msg),
            Error::DisconnectError(msg) => write!(f, "Disconnect error: {}", msg),
            Error::ReadError(msg) => write!(f, "Read error: {}", msg),
            Error::WriteError(msg) => write!(f, "Write error: {}", msg),
            Error::WouldBlock => write!(f, "Read would block"),
            // Framing
            Error::InvalidHeader => write!(f, "Invalid frame header"),
            Error::Crc16Mismatch { expected, actual } => write!(
                f,
                "CRC16 mismatch: computed 0x{:04x}, received 0x{:04x}",
                expected, actual
            ),
            Error::InsufficientBuffer { needed, capacity } => write!(
                f,
                "Payload of {} bytes exceeds buffer capacity {}",
                needed, capacity
            ),
            // Wire
            Error::Encode(msg) => write!(f, "Serialization failed: {}", msg),
            Error::Decode(msg) => write!(f, "Deserialization failed: {}", msg),
            Error::UnknownBundleId(id) => {
                write!(f, "Received bundle with unknown id 0x{:x}", id)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ConfigRead(e) => Some(e),
            _ => None,
        }
    }
}
