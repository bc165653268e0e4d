// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol Buffers wire schema for bundles.
//!
//! Hand-authored `prost` messages pinned to the field tags existing peers
//! expect: `Bundle.id` = 1, `Bundle.signals` = 2, and the signal `oneof`
//! covering tags 1-9 for scalars and 10-18 for lists (`ListBytes` = 18).
//! Each `List*` wrapper carries its elements in field 1.

use prost::Message;

use crate::error::{Error, Result};

/// A bundle on the wire: a schema id plus its ordered signal values.
#[derive(Clone, PartialEq, Message)]
pub struct Bundle {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(message, repeated, tag = "2")]
    pub signals: Vec<Signal>,
}

/// A single signal value, exactly one variant at a time.
#[derive(Clone, PartialEq, Message)]
pub struct Signal {
    #[prost(
        oneof = "signal::Value",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18"
    )]
    pub value: Option<signal::Value>,
}

/// Nested types for [`Signal`].
pub mod signal {
    /// The signal variant set. The tag assignment is wire-frozen.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(double, tag = "1")]
        Double(f64),
        #[prost(float, tag = "2")]
        Float(f32),
        #[prost(int32, tag = "3")]
        Int32(i32),
        #[prost(int64, tag = "4")]
        Int64(i64),
        #[prost(uint32, tag = "5")]
        Uint32(u32),
        #[prost(uint64, tag = "6")]
        Uint64(u64),
        #[prost(bool, tag = "7")]
        Bool(bool),
        #[prost(string, tag = "8")]
        String(String),
        #[prost(bytes = "vec", tag = "9")]
        Bytes(Vec<u8>),
        #[prost(message, tag = "10")]
        ListDouble(super::ListDoubles),
        #[prost(message, tag = "11")]
        ListFloat(super::ListFloats),
        #[prost(message, tag = "12")]
        ListInt32(super::ListInt32s),
        #[prost(message, tag = "13")]
        ListInt64(super::ListInt64s),
        #[prost(message, tag = "14")]
        ListUint32(super::ListUint32s),
        #[prost(message, tag = "15")]
        ListUint64(super::ListUint64s),
        #[prost(message, tag = "16")]
        ListBool(super::ListBools),
        #[prost(message, tag = "17")]
        ListString(super::ListStrings),
        #[prost(message, tag = "18")]
        ListBytes(super::ListBytes),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ListDoubles {
    #[prost(double, repeated, tag = "1")]
    pub doubles: Vec<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListFloats {
    #[prost(float, repeated, tag = "1")]
    pub floats: Vec<f32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListInt32s {
    #[prost(int32, repeated, tag = "1")]
    pub int32s: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListInt64s {
    #[prost(int64, repeated, tag = "1")]
    pub int64s: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListUint32s {
    #[prost(uint32, repeated, tag = "1")]
    pub uint32s: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListUint64s {
    #[prost(uint64, repeated, tag = "1")]
    pub uint64s: Vec<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListBools {
    #[prost(bool, repeated, tag = "1")]
    pub bools: Vec<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListStrings {
    #[prost(string, repeated, tag = "1")]
    pub strings: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ListBytes {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub bytes: Vec<Vec<u8>>,
}

/// Decode only the bundle id from a serialized buffer.
///
/// The receive path dispatches on the id before paying for a full decode.
/// A leading key other than field 1 means the id field was omitted because
/// it holds the default value, i.e. the heartbeat id 0.
pub fn decode_id(buf: &[u8]) -> Result<u32> {
    use prost::encoding::{decode_key, decode_varint, WireType};

    if buf.is_empty() {
        return Err(Error::Decode("empty buffer".into()));
    }
    let mut cursor = buf;
    let (tag, wire_type) =
        decode_key(&mut cursor).map_err(|e| Error::Decode(e.to_string()))?;
    if tag != 1 {
        return Ok(0);
    }
    if wire_type != WireType::Varint {
        return Err(Error::Decode(format!(
            "unexpected wire type {:?} for bundle id",
            wire_type
        )));
    }
    let id = decode_varint(&mut cursor).map_err(|e| Error::Decode(e.to_string()))?;
    u32::try_from(id).map_err(|_| Error::Decode("bundle id overflows u32".into()))
}

/// Decode a full wire bundle.
pub fn decode(buf: &[u8]) -> Result<Bundle> {
    Bundle::decode(buf).map_err(|e| Error::Decode(e.to_string()))
}

// ===== Tests =====
