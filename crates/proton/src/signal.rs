// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Signal typing: the closed variant set, per-signal schema records, and the
//! typed value traits used by bundle handles.
//!
//! A signal's variant tag is fixed at construction from its schema and never
//! changes. List signals hold exactly `length` elements at all times;
//! string/bytes signals (and their list elements) never grow past
//! `capacity`.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::wire;
use crate::wire::signal::Value;

/// The closed set of signal value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Bool,
    String,
    Bytes,
    ListDouble,
    ListFloat,
    ListInt32,
    ListInt64,
    ListUint32,
    ListUint64,
    ListBool,
    ListString,
    ListBytes,
}

impl SignalKind {
    /// True for the `list_*` kinds.
    #[must_use]
    pub fn is_list(self) -> bool {
        matches!(
            self,
            SignalKind::ListDouble
                | SignalKind::ListFloat
                | SignalKind::ListInt32
                | SignalKind::ListInt64
                | SignalKind::ListUint32
                | SignalKind::ListUint64
                | SignalKind::ListBool
                | SignalKind::ListString
                | SignalKind::ListBytes
        )
    }

    /// True for the kinds whose values carry a byte capacity.
    #[must_use]
    pub fn has_capacity(self) -> bool {
        matches!(
            self,
            SignalKind::String
                | SignalKind::Bytes
                | SignalKind::ListString
                | SignalKind::ListBytes
        )
    }

    /// The kind a wire value belongs to.
    #[must_use]
    pub fn of(value: &Value) -> SignalKind {
        match value {
            Value::Double(_) => SignalKind::Double,
            Value::Float(_) => SignalKind::Float,
            Value::Int32(_) => SignalKind::Int32,
            Value::Int64(_) => SignalKind::Int64,
            Value::Uint32(_) => SignalKind::Uint32,
            Value::Uint64(_) => SignalKind::Uint64,
            Value::Bool(_) => SignalKind::Bool,
            Value::String(_) => SignalKind::String,
            Value::Bytes(_) => SignalKind::Bytes,
            Value::ListDouble(_) => SignalKind::ListDouble,
            Value::ListFloat(_) => SignalKind::ListFloat,
            Value::ListInt32(_) => SignalKind::ListInt32,
            Value::ListInt64(_) => SignalKind::ListInt64,
            Value::ListUint32(_) => SignalKind::ListUint32,
            Value::ListUint64(_) => SignalKind::ListUint64,
            Value::ListBool(_) => SignalKind::ListBool,
            Value::ListString(_) => SignalKind::ListString,
            Value::ListBytes(_) => SignalKind::ListBytes,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalKind::Double => "double",
            SignalKind::Float => "float",
            SignalKind::Int32 => "int32",
            SignalKind::Int64 => "int64",
            SignalKind::Uint32 => "uint32",
            SignalKind::Uint64 => "uint64",
            SignalKind::Bool => "bool",
            SignalKind::String => "string",
            SignalKind::Bytes => "bytes",
            SignalKind::ListDouble => "list_double",
            SignalKind::ListFloat => "list_float",
            SignalKind::ListInt32 => "list_int32",
            SignalKind::ListInt64 => "list_int64",
            SignalKind::ListUint32 => "list_uint32",
            SignalKind::ListUint64 => "list_uint64",
            SignalKind::ListBool => "list_bool",
            SignalKind::ListString => "list_string",
            SignalKind::ListBytes => "list_bytes",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SignalKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "double" => Ok(SignalKind::Double),
            "float" => Ok(SignalKind::Float),
            "int32" => Ok(SignalKind::Int32),
            "int64" => Ok(SignalKind::Int64),
            "uint32" => Ok(SignalKind::Uint32),
            "uint64" => Ok(SignalKind::Uint64),
            "bool" => Ok(SignalKind::Bool),
            "string" => Ok(SignalKind::String),
            "bytes" => Ok(SignalKind::Bytes),
            "list_double" => Ok(SignalKind::ListDouble),
            "list_float" => Ok(SignalKind::ListFloat),
            "list_int32" => Ok(SignalKind::ListInt32),
            "list_int64" => Ok(SignalKind::ListInt64),
            "list_uint32" => Ok(SignalKind::ListUint32),
            "list_uint64" => Ok(SignalKind::ListUint64),
            "list_bool" => Ok(SignalKind::ListBool),
            "list_string" => Ok(SignalKind::ListString),
            "list_bytes" => Ok(SignalKind::ListBytes),
            other => Err(Error::InvalidConfig(format!("invalid signal type '{}'", other))),
        }
    }
}

/// Schema record for one signal inside a bundle.
///
/// `length` is the fixed element count for list kinds (0 for scalars);
/// `capacity` is the maximum byte length for string/bytes values and list
/// elements (0 otherwise). A constant signal refuses every set.
#[derive(Debug, Clone)]
pub struct SignalSpec {
    pub name: String,
    pub bundle: String,
    pub kind: SignalKind,
    pub length: u32,
    pub capacity: u32,
    pub is_const: bool,
    /// Position in the bundle's signal vector.
    pub index: usize,
}

impl SignalSpec {
    /// The value this signal holds right after construction: numeric zero,
    /// empty string/bytes with `capacity` reserved, lists of `length`
    /// default elements.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        let n = self.length as usize;
        match self.kind {
            SignalKind::Double => Value::Double(0.0),
            SignalKind::Float => Value::Float(0.0),
            SignalKind::Int32 => Value::Int32(0),
            SignalKind::Int64 => Value::Int64(0),
            SignalKind::Uint32 => Value::Uint32(0),
            SignalKind::Uint64 => Value::Uint64(0),
            SignalKind::Bool => Value::Bool(false),
            SignalKind::String => Value::String(String::with_capacity(self.capacity as usize)),
            SignalKind::Bytes => Value::Bytes(Vec::with_capacity(self.capacity as usize)),
            SignalKind::ListDouble => Value::ListDouble(wire::ListDoubles {
                doubles: vec![0.0; n],
            }),
            SignalKind::ListFloat => Value::ListFloat(wire::ListFloats {
                floats: vec![0.0; n],
            }),
            SignalKind::ListInt32 => Value::ListInt32(wire::ListInt32s { int32s: vec![0; n] }),
            SignalKind::ListInt64 => Value::ListInt64(wire::ListInt64s { int64s: vec![0; n] }),
            SignalKind::ListUint32 => Value::ListUint32(wire::ListUint32s {
                uint32s: vec![0; n],
            }),
            SignalKind::ListUint64 => Value::ListUint64(wire::ListUint64s {
                uint64s: vec![0; n],
            }),
            SignalKind::ListBool => Value::ListBool(wire::ListBools {
                bools: vec![false; n],
            }),
            SignalKind::ListString => Value::ListString(wire::ListStrings {
                strings: vec![String::new(); n],
            }),
            SignalKind::ListBytes => Value::ListBytes(wire::ListBytes {
                bytes: vec![Vec::new(); n],
            }),
        }
    }

    /// Check a candidate value against this spec: variant tag, exact list
    /// length, and byte capacities. Fails without mutating anything.
    pub fn validate_value(&self, value: &Value) -> Result<()> {
        if SignalKind::of(value) != self.kind {
            return Err(Error::WrongType {
                signal: self.name.clone(),
                requested: SignalKind::of(value),
            });
        }
        if self.kind.is_list() {
            let actual = list_len(value);
            if actual != self.length as usize {
                return Err(Error::WrongLength {
                    signal: self.name.clone(),
                    expected: self.length,
                    actual,
                });
            }
        }
        self.check_capacity(value)
    }

    fn check_capacity(&self, value: &Value) -> Result<()> {
        let capacity = self.capacity as usize;
        let over = |actual: usize| Error::CapacityExceeded {
            signal: self.name.clone(),
            capacity: self.capacity,
            actual,
        };
        match value {
            Value::String(s) if s.len() > capacity => Err(over(s.len())),
            Value::Bytes(b) if b.len() > capacity => Err(over(b.len())),
            Value::ListString(list) => {
                for s in &list.strings {
                    if s.len() > capacity {
                        return Err(over(s.len()));
                    }
                }
                Ok(())
            }
            Value::ListBytes(list) => {
                for b in &list.bytes {
                    if b.len() > capacity {
                        return Err(over(b.len()));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Convert a YAML default literal into a wire value for this signal.
    pub fn value_from_yaml(&self, literal: &serde_yaml::Value) -> Result<Value> {
        let value = yaml_to_value(self.kind, literal).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "default value for signal '{}' is not a valid {}",
                self.name, self.kind
            ))
        })?;
        self.validate_value(&value)?;
        Ok(value)
    }
}

/// Element count of a list value.
#[must_use]
pub fn list_len(value: &Value) -> usize {
    match value {
        Value::ListDouble(l) => l.doubles.len(),
        Value::ListFloat(l) => l.floats.len(),
        Value::ListInt32(l) => l.int32s.len(),
        Value::ListInt64(l) => l.int64s.len(),
        Value::ListUint32(l) => l.uint32s.len(),
        Value::ListUint64(l) => l.uint64s.len(),
        Value::ListBool(l) => l.bools.len(),
        Value::ListString(l) => l.strings.len(),
        Value::ListBytes(l) => l.bytes.len(),
        _ => 0,
    }
}

fn yaml_to_value(kind: SignalKind, literal: &serde_yaml::Value) -> Option<Value> {
    use serde_yaml::Value as Yaml;

    fn seq<'a>(literal: &'a Yaml) -> Option<&'a Vec<Yaml>> {
        literal.as_sequence()
    }

    fn byte_seq(literal: &Yaml) -> Option<Vec<u8>> {
        seq(literal)?
            .iter()
            .map(|v| u8::try_from(v.as_u64()?).ok())
            .collect()
    }

    match kind {
        SignalKind::Double => Some(Value::Double(literal.as_f64()?)),
        SignalKind::Float => Some(Value::Float(literal.as_f64()? as f32)),
        SignalKind::Int32 => Some(Value::Int32(i32::try_from(literal.as_i64()?).ok()?)),
        SignalKind::Int64 => Some(Value::Int64(literal.as_i64()?)),
        SignalKind::Uint32 => Some(Value::Uint32(u32::try_from(literal.as_u64()?).ok()?)),
        SignalKind::Uint64 => Some(Value::Uint64(literal.as_u64()?)),
        SignalKind::Bool => Some(Value::Bool(literal.as_bool()?)),
        SignalKind::String => Some(Value::String(literal.as_str()?.to_owned())),
        SignalKind::Bytes => Some(Value::Bytes(byte_seq(literal)?)),
        SignalKind::ListDouble => Some(Value::ListDouble(wire::ListDoubles {
            doubles: seq(literal)?.iter().map(Yaml::as_f64).collect::<Option<_>>()?,
        })),
        SignalKind::ListFloat => Some(Value::ListFloat(wire::ListFloats {
            floats: seq(literal)?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<_>>()?,
        })),
        SignalKind::ListInt32 => Some(Value::ListInt32(wire::ListInt32s {
            int32s: seq(literal)?
                .iter()
                .map(|v| i32::try_from(v.as_i64()?).ok())
                .collect::<Option<_>>()?,
        })),
        SignalKind::ListInt64 => Some(Value::ListInt64(wire::ListInt64s {
            int64s: seq(literal)?.iter().map(Yaml::as_i64).collect::<Option<_>>()?,
        })),
        SignalKind::ListUint32 => Some(Value::ListUint32(wire::ListUint32s {
            uint32s: seq(literal)?
                .iter()
                .map(|v| u32::try_from(v.as_u64()?).ok())
                .collect::<Option<_>>()?,
        })),
        SignalKind::ListUint64 => Some(Value::ListUint64(wire::ListUint64s {
            uint64s: seq(literal)?.iter().map(Yaml::as_u64).collect::<Option<_>>()?,
        })),
        SignalKind::ListBool => Some(Value::ListBool(wire::ListBools {
            bools: seq(literal)?.iter().map(Yaml::as_bool).collect::<Option<_>>()?,
        })),
        SignalKind::ListString => Some(Value::ListString(wire::ListStrings {
            strings: seq(literal)?
                .iter()
                .map(|v| v.as_str().map(str::to_owned))
                .collect::<Option<_>>()?,
        })),
        SignalKind::ListBytes => Some(Value::ListBytes(wire::ListBytes {
            bytes: seq(literal)?.iter().map(byte_seq).collect::<Option<_>>()?,
        })),
    }
}

/// A Rust type that maps onto one signal variant for whole-value get/set.
pub trait SignalValue: Sized {
    /// The variant this type reads and writes.
    const KIND: SignalKind;

    /// Extract the typed value; `None` when the variant tag disagrees.
    fn from_wire(value: &Value) -> Option<Self>;

    /// Wrap the typed value into its wire variant.
    fn into_wire(self) -> Value;
}

macro_rules! scalar_signal_value {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl SignalValue for $ty {
            const KIND: SignalKind = SignalKind::$kind;

            fn from_wire(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn into_wire(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

scalar_signal_value!(f64, Double, Double);
scalar_signal_value!(f32, Float, Float);
scalar_signal_value!(i32, Int32, Int32);
scalar_signal_value!(i64, Int64, Int64);
scalar_signal_value!(u32, Uint32, Uint32);
scalar_signal_value!(u64, Uint64, Uint64);
scalar_signal_value!(bool, Bool, Bool);

impl SignalValue for String {
    const KIND: SignalKind = SignalKind::String;

    fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_wire(self) -> Value {
        Value::String(self)
    }
}

impl SignalValue for Vec<u8> {
    const KIND: SignalKind = SignalKind::Bytes;

    fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn into_wire(self) -> Value {
        Value::Bytes(self)
    }
}

macro_rules! list_signal_value {
    ($elem:ty, $kind:ident, $variant:ident, $wrapper:ident, $field:ident) => {
        impl SignalValue for Vec<$elem> {
            const KIND: SignalKind = SignalKind::$kind;

            fn from_wire(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(list) => Some(list.$field.clone()),
                    _ => None,
                }
            }

            fn into_wire(self) -> Value {
                Value::$variant(wire::$wrapper { $field: self })
            }
        }
    };
}

list_signal_value!(f64, ListDouble, ListDouble, ListDoubles, doubles);
list_signal_value!(f32, ListFloat, ListFloat, ListFloats, floats);
list_signal_value!(i32, ListInt32, ListInt32, ListInt32s, int32s);
list_signal_value!(i64, ListInt64, ListInt64, ListInt64s, int64s);
list_signal_value!(u32, ListUint32, ListUint32, ListUint32s, uint32s);
list_signal_value!(u64, ListUint64, ListUint64, ListUint64s, uint64s);
list_signal_value!(bool, ListBool, ListBool, ListBools, bools);
list_signal_value!(String, ListString, ListString, ListStrings, strings);
list_signal_value!(Vec<u8>, ListBytes, ListBytes, ListBytes, bytes);

/// A Rust type that maps onto one element of a list variant for indexed
/// get/set.
pub trait SignalElement: Sized {
    /// The list variant this element type belongs to.
    const LIST_KIND: SignalKind;

    fn get_at(value: &Value, index: usize) -> Option<Self>;

    /// Replace the element at `index`; `false` when the variant tag
    /// disagrees or the index is out of bounds.
    fn put_at(value: &mut Value, index: usize, element: Self) -> bool;

    /// Byte length for capacity-checked element types; `None` for numerics.
    fn byte_len(&self) -> Option<usize> {
        None
    }
}

macro_rules! signal_element {
    ($elem:ty, $kind:ident, $variant:ident, $field:ident) => {
        impl SignalElement for $elem {
            const LIST_KIND: SignalKind = SignalKind::$kind;

            fn get_at(value: &Value, index: usize) -> Option<Self> {
                match value {
                    Value::$variant(list) => list.$field.get(index).cloned(),
                    _ => None,
                }
            }

            fn put_at(value: &mut Value, index: usize, element: Self) -> bool {
                match value {
                    Value::$variant(list) => match list.$field.get_mut(index) {
                        Some(slot) => {
                            *slot = element;
                            true
                        }
                        None => false,
                    },
                    _ => false,
                }
            }
        }
    };
}

signal_element!(f64, ListDouble, ListDouble, doubles);
signal_element!(f32, ListFloat, ListFloat, floats);
signal_element!(i32, ListInt32, ListInt32, int32s);
signal_element!(i64, ListInt64, ListInt64, int64s);
signal_element!(u32, ListUint32, ListUint32, uint32s);
signal_element!(u64, ListUint64, ListUint64, uint64s);
signal_element!(bool, ListBool, ListBool, bools);

impl SignalElement for String {
    const LIST_KIND: SignalKind = SignalKind::ListString;

    fn get_at(value: &Value, index: usize) -> Option<Self> {
        match value {
            Value::ListString(list) => list.strings.get(index).cloned(),
            _ => None,
        }
    }

    fn put_at(value: &mut Value, index: usize, element: Self) -> bool {
        match value {
            Value::ListString(list) => match list.strings.get_mut(index) {
                Some(slot) => {
                    *slot = element;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn byte_len(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl SignalElement for Vec<u8> {
    const LIST_KIND: SignalKind = SignalKind::ListBytes;

    fn get_at(value: &Value, index: usize) -> Option<Self> {
        match value {
            Value::ListBytes(list) => list.bytes.get(index).cloned(),
            _ => None,
        }
    }

    fn put_at(value: &mut Value, index: usize, element: Self) -> bool {
        match value {
            Value::ListBytes(list) => match list.bytes.get_mut(index) {
                Some(slot) => {
                    *slot = element;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn byte_len(&self) -> Option<usize> {
        Some(self.len())
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: SignalKind, length: u32, capacity: u32) -> SignalSpec {
        SignalSpec {
            name: "sig".into(),
            bundle: "test".into(),
            kind,
            length,
            capacity,
            is_const: false,
            index: 0,
        }
    }

    #[test]
    fn test_kind_parse_all_type_strings() {
        let names = [
            "double",
            "float",
            "int32",
            "int64",
            "uint32",
            "uint64",
            "bool",
            "string",
            "bytes",
            "list_double",
            "list_float",
            "list_int32",
            "list_int64",
            "list_uint32",
            "list_uint64",
            "list_bool",
            "list_string",
            "list_bytes",
        ];
        for name in names {
            let kind: SignalKind = name.parse().expect("known type string should parse");
            assert_eq!(kind.to_string(), name);
        }
        assert!("list_int8".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_initial_value_zero_fill() {
        let v = spec(SignalKind::ListInt32, 4, 0).initial_value();
        assert_eq!(list_len(&v), 4);
        assert_eq!(v, Value::ListInt32(wire::ListInt32s { int32s: vec![0; 4] }));

        let v = spec(SignalKind::String, 0, 16).initial_value();
        match v {
            Value::String(s) => assert!(s.is_empty()),
            other => panic!("expected empty string, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_value_wrong_type() {
        let s = spec(SignalKind::Double, 0, 0);
        let err = s
            .validate_value(&Value::Float(1.0))
            .expect_err("float into a double signal must fail");
        assert!(matches!(err, Error::WrongType { .. }));
    }

    #[test]
    fn test_validate_value_list_length() {
        let s = spec(SignalKind::ListFloat, 2, 0);
        s.validate_value(&vec![0.1f32, 0.2].into_wire())
            .expect("exact length should pass");
        let err = s
            .validate_value(&vec![0.1f32].into_wire())
            .expect_err("short list must fail");
        assert!(matches!(err, Error::WrongLength { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_validate_value_capacity_boundary() {
        let s = spec(SignalKind::String, 0, 4);
        s.validate_value(&"abcd".to_owned().into_wire())
            .expect("exactly capacity bytes should pass");
        let err = s
            .validate_value(&"abcde".to_owned().into_wire())
            .expect_err("capacity + 1 must fail");
        assert!(matches!(err, Error::CapacityExceeded { capacity: 4, actual: 5, .. }));
    }

    #[test]
    fn test_validate_list_string_element_capacity() {
        let s = spec(SignalKind::ListString, 2, 3);
        s.validate_value(&vec!["abc".to_owned(), "".to_owned()].into_wire())
            .expect("elements within capacity should pass");
        let err = s
            .validate_value(&vec!["abcd".to_owned(), "".to_owned()].into_wire())
            .expect_err("oversized element must fail");
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn test_yaml_literal_scalar() {
        let s = spec(SignalKind::Double, 0, 0);
        let literal: serde_yaml::Value = serde_yaml::from_str("1.234").expect("yaml");
        assert_eq!(
            s.value_from_yaml(&literal).expect("literal should convert"),
            Value::Double(1.234)
        );
    }

    #[test]
    fn test_yaml_literal_bytes() {
        let s = spec(SignalKind::Bytes, 0, 4);
        let literal: serde_yaml::Value = serde_yaml::from_str("[0, 1, 2, 3]").expect("yaml");
        assert_eq!(
            s.value_from_yaml(&literal).expect("literal should convert"),
            Value::Bytes(vec![0, 1, 2, 3])
        );
    }

    #[test]
    fn test_yaml_literal_list_length_enforced() {
        let s = spec(SignalKind::ListFloat, 2, 0);
        let literal: serde_yaml::Value = serde_yaml::from_str("[0.1, 0.2, 0.3]").expect("yaml");
        assert!(s.value_from_yaml(&literal).is_err());
    }

    #[test]
    fn test_yaml_literal_type_mismatch() {
        let s = spec(SignalKind::Uint32, 0, 0);
        let literal: serde_yaml::Value = serde_yaml::from_str("\"not a number\"").expect("yaml");
        assert!(matches!(
            s.value_from_yaml(&literal),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_element_put_at() {
        let mut v = vec![0.0f64, 0.0].into_wire();
        assert!(f64::put_at(&mut v, 1, 7.5));
        assert_eq!(f64::get_at(&v, 1), Some(7.5));
        assert!(!f64::put_at(&mut v, 2, 1.0));
        assert!(!f32::put_at(&mut v, 0, 1.0));
    }
}
