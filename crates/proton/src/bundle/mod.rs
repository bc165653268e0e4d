// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundle handles: schema-bound accessors over wire-format bundle storage.
//!
//! A [`BundleHandle`] owns the serialized-form [`wire::Bundle`] for one
//! schema bundle. The signal set (names, order, variant tags) is fixed at
//! construction; receive overwrites values positionally and user code reads
//! and writes through typed [`SignalHandle`] views that never outlive the
//! handle.

mod manager;

pub use manager::BundleManager;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::config::{BundleConfig, SignalConfig};
use crate::error::{Error, Result};
use crate::signal::{SignalElement, SignalKind, SignalSpec, SignalValue};
use crate::wire;

/// Callback invoked on the spin thread after a successful incoming decode.
///
/// The borrowed handle keeps callbacks from owning the bundle that stores
/// them.
pub type BundleCallback = Box<dyn Fn(&BundleHandle) + Send + Sync + 'static>;

/// A schema bundle and its wire-format value storage.
pub struct BundleHandle {
    name: String,
    id: u32,
    producer: String,
    consumer: String,
    specs: Vec<SignalSpec>,
    index: HashMap<String, usize>,
    storage: Mutex<wire::Bundle>,
    callback: RwLock<Option<BundleCallback>>,
    rx_count: AtomicU64,
    tx_count: AtomicU64,
    rxps: AtomicU64,
    txps: AtomicU64,
}

impl std::fmt::Debug for BundleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("producer", &self.producer)
            .field("consumer", &self.consumer)
            .field("specs", &self.specs)
            .field("index", &self.index)
            .field("storage", &self.storage)
            .field("callback", &self.callback.read().is_some())
            .field("rx_count", &self.rx_count)
            .field("tx_count", &self.tx_count)
            .field("rxps", &self.rxps)
            .field("txps", &self.txps)
            .finish()
    }
}

impl BundleHandle {
    /// Build a handle from a schema record, appending every configured
    /// signal in order.
    pub fn new(config: &BundleConfig) -> Result<Self> {
        let mut handle = Self::empty(&config.name, config.id, &config.producer, &config.consumer);
        for signal in &config.signals {
            handle.add_signal(signal)?;
        }
        Ok(handle)
    }

    /// The heartbeat bundle registered for one producer/consumer pair:
    /// id 0, a single `uint32` signal named `heartbeat`.
    pub fn heartbeat(producer: &str, consumer: &str) -> Self {
        let mut handle = Self::empty(
            &format!("{}_heartbeat", producer),
            crate::HEARTBEAT_ID,
            producer,
            consumer,
        );
        let signal = SignalConfig::scalar("heartbeat", SignalKind::Uint32);
        handle
            .add_signal(&signal)
            .expect("heartbeat signal config is statically valid");
        handle
    }

    fn empty(name: &str, id: u32, producer: &str, consumer: &str) -> Self {
        Self {
            name: name.to_owned(),
            id,
            producer: producer.to_owned(),
            consumer: consumer.to_owned(),
            specs: Vec::new(),
            index: HashMap::new(),
            storage: Mutex::new(wire::Bundle {
                id,
                signals: Vec::new(),
            }),
            callback: RwLock::new(None),
            rx_count: AtomicU64::new(0),
            tx_count: AtomicU64::new(0),
            rxps: AtomicU64::new(0),
            txps: AtomicU64::new(0),
        }
    }

    /// Append a signal at the end of the bundle's signal vector.
    ///
    /// Lists come up holding exactly `length` default elements; a default
    /// literal is assigned last and makes the signal constant.
    pub fn add_signal(&mut self, config: &SignalConfig) -> Result<()> {
        if self.index.contains_key(&config.name) {
            return Err(Error::InvalidConfig(format!(
                "duplicate signal '{}' in bundle '{}'",
                config.name, self.name
            )));
        }
        let spec = config.resolve(&self.name, self.specs.len())?;
        let value = match &config.value {
            Some(literal) => spec.value_from_yaml(literal)?,
            None => spec.initial_value(),
        };
        self.storage.lock().signals.push(wire::Signal {
            value: Some(value),
        });
        self.index.insert(spec.name.clone(), spec.index);
        self.specs.push(spec);
        Ok(())
    }

    /// Typed view of the named signal.
    pub fn signal(&self, name: &str) -> Result<SignalHandle<'_>> {
        let index = *self.index.get(name).ok_or_else(|| Error::UnknownSignal {
            bundle: self.name.clone(),
            signal: name.to_owned(),
        })?;
        Ok(SignalHandle {
            handle: self,
            spec: &self.specs[index],
        })
    }

    /// Total predicate over the signal set.
    #[must_use]
    pub fn has_signal(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Store the callback invoked on successful incoming decode.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&BundleHandle) + Send + Sync + 'static,
    {
        *self.callback.write() = Some(Box::new(callback));
    }

    /// Invoke the registered callback, if any.
    pub(crate) fn notify(&self) {
        if let Some(callback) = self.callback.read().as_ref() {
            callback(self);
        }
    }

    /// Lock and expose the underlying serialized-form bundle.
    ///
    /// The id and the signal order/types behind the guard are immutable by
    /// contract; mutating values through this guard bypasses capacity
    /// checks and is for inspection and encode paths.
    pub fn bundle(&self) -> MutexGuard<'_, wire::Bundle> {
        self.storage.lock()
    }

    /// Serialize the bundle into `buf` (cleared first).
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<usize> {
        use prost::Message;

        let storage = self.storage.lock();
        let len = storage.encoded_len();
        if len > crate::MAX_MESSAGE_SIZE {
            return Err(Error::InsufficientBuffer {
                needed: len,
                capacity: crate::MAX_MESSAGE_SIZE,
            });
        }
        buf.clear();
        storage
            .encode(buf)
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(len)
    }

    /// Overwrite signal values positionally from a decoded wire bundle.
    ///
    /// Metadata is untouched; incoming signals whose variant tag disagrees
    /// with the schema, and signals past the local count, are dropped.
    pub(crate) fn assign(&self, incoming: wire::Bundle) {
        let mut storage = self.storage.lock();
        for (i, signal) in incoming
            .signals
            .into_iter()
            .enumerate()
            .take(self.specs.len())
        {
            if let Some(value) = signal.value {
                if SignalKind::of(&value) == self.specs[i].kind {
                    storage.signals[i].value = Some(value);
                }
            }
        }
    }

    // ===== Accessors =====

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    #[must_use]
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Signal metadata in bundle order.
    #[must_use]
    pub fn signals(&self) -> &[SignalSpec] {
        &self.specs
    }

    // ===== Counters =====

    pub(crate) fn mark_received(&self) {
        self.rx_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_sent(&self) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn rx_count(&self) -> u64 {
        self.rx_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tx_count(&self) -> u64 {
        self.tx_count.load(Ordering::Relaxed)
    }

    /// Snapshot the per-second rates and reset the counters. Called by the
    /// 1 Hz sampler.
    pub(crate) fn sample_rates(&self) {
        self.rxps
            .store(self.rx_count.swap(0, Ordering::Relaxed), Ordering::Relaxed);
        self.txps
            .store(self.tx_count.swap(0, Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Bundles received per second, as of the last sampler tick.
    #[must_use]
    pub fn rxps(&self) -> u64 {
        self.rxps.load(Ordering::Relaxed)
    }

    /// Bundles sent per second, as of the last sampler tick.
    #[must_use]
    pub fn txps(&self) -> u64 {
        self.txps.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for BundleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.lock();
        writeln!(f, "{} bundle {{", self.name)?;
        writeln!(f, "  id: 0x{:x}", self.id)?;
        writeln!(f, "  signals: {{")?;
        for spec in &self.specs {
            match storage.signals[spec.index].value.as_ref() {
                Some(value) => writeln!(f, "    {}: {}", spec.name, format_value(value))?,
                None => writeln!(f, "    {}: <unset>", spec.name)?,
            }
        }
        writeln!(f, "  }}")?;
        write!(f, "}}")
    }
}

fn format_value(value: &wire::signal::Value) -> String {
    use crate::wire::signal::Value;

    match value {
        Value::Double(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Uint32(v) => v.to_string(),
        Value::Uint64(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::String(v) => format!("{:?}", v),
        Value::Bytes(v) => format!("{:02x?}", v),
        Value::ListDouble(l) => format!("{:?}", l.doubles),
        Value::ListFloat(l) => format!("{:?}", l.floats),
        Value::ListInt32(l) => format!("{:?}", l.int32s),
        Value::ListInt64(l) => format!("{:?}", l.int64s),
        Value::ListUint32(l) => format!("{:?}", l.uint32s),
        Value::ListUint64(l) => format!("{:?}", l.uint64s),
        Value::ListBool(l) => format!("{:?}", l.bools),
        Value::ListString(l) => format!("{:?}", l.strings),
        Value::ListBytes(l) => format!("{:02x?}", l.bytes),
    }
}

/// Typed, bounds-checked view of one signal inside a bundle.
///
/// Borrowed from the handle; every access takes the storage lock for the
/// duration of the call.
pub struct SignalHandle<'b> {
    handle: &'b BundleHandle,
    spec: &'b SignalSpec,
}

impl SignalHandle<'_> {
    /// Read the current value.
    ///
    /// Fails with [`Error::WrongType`] when `T` does not match the
    /// signal's variant tag.
    pub fn get<T: SignalValue>(&self) -> Result<T> {
        if T::KIND != self.spec.kind {
            return Err(self.wrong_type(T::KIND));
        }
        let storage = self.handle.storage.lock();
        storage.signals[self.spec.index]
            .value
            .as_ref()
            .and_then(T::from_wire)
            .ok_or_else(|| self.wrong_type(T::KIND))
    }

    /// Replace the whole value.
    ///
    /// Lists take exactly `length` elements; string/bytes values (and list
    /// elements) may not exceed `capacity`; constant signals refuse every
    /// set. Failure leaves the stored value unchanged.
    pub fn set<T: SignalValue>(&self, value: T) -> Result<()> {
        if self.spec.is_const {
            return Err(Error::ConstSignal(self.spec.name.clone()));
        }
        if T::KIND != self.spec.kind {
            return Err(self.wrong_type(T::KIND));
        }
        let value = value.into_wire();
        self.spec.validate_value(&value)?;
        let mut storage = self.handle.storage.lock();
        storage.signals[self.spec.index].value = Some(value);
        Ok(())
    }

    /// Read one element of a list signal.
    pub fn get_at<T: SignalElement>(&self, index: usize) -> Result<T> {
        if T::LIST_KIND != self.spec.kind {
            return Err(self.wrong_type(T::LIST_KIND));
        }
        if index >= self.spec.length as usize {
            return Err(self.out_of_range(index));
        }
        let storage = self.handle.storage.lock();
        storage.signals[self.spec.index]
            .value
            .as_ref()
            .and_then(|v| T::get_at(v, index))
            .ok_or_else(|| self.wrong_type(T::LIST_KIND))
    }

    /// Replace one element of a list signal.
    pub fn set_at<T: SignalElement>(&self, index: usize, element: T) -> Result<()> {
        if self.spec.is_const {
            return Err(Error::ConstSignal(self.spec.name.clone()));
        }
        if T::LIST_KIND != self.spec.kind {
            return Err(self.wrong_type(T::LIST_KIND));
        }
        if index >= self.spec.length as usize {
            return Err(self.out_of_range(index));
        }
        if let Some(len) = element.byte_len() {
            if len > self.spec.capacity as usize {
                return Err(Error::CapacityExceeded {
                    signal: self.spec.name.clone(),
                    capacity: self.spec.capacity,
                    actual: len,
                });
            }
        }
        let mut storage = self.handle.storage.lock();
        let value = storage.signals[self.spec.index]
            .value
            .as_mut()
            .ok_or_else(|| self.wrong_type(T::LIST_KIND))?;
        if T::put_at(value, index, element) {
            Ok(())
        } else {
            Err(self.out_of_range(index))
        }
    }

    // ===== Metadata accessors =====

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn kind(&self) -> SignalKind {
        self.spec.kind
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.spec.length
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.spec.capacity
    }

    #[must_use]
    pub fn is_const(&self) -> bool {
        self.spec.is_const
    }

    fn wrong_type(&self, requested: SignalKind) -> Error {
        Error::WrongType {
            signal: self.spec.name.clone(),
            requested,
        }
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::OutOfRange {
            signal: self.spec.name.clone(),
            index,
            length: self.spec.length,
        }
    }
}

// ===== Tests =====
