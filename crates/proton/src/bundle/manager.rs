// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundle registry and parse-and-dispatch.
//!
//! Owns every bundle handle of a node. Non-heartbeat bundles are indexed by
//! name and by id; heartbeat bundles all share id 0, so they are indexed by
//! producer name instead. Lookups are read-mostly and lock-free per shard;
//! registration happens only during node configuration.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bundle::BundleHandle;
use crate::config::BundleConfig;
use crate::error::{Error, Result};
use crate::signal::SignalKind;
use crate::wire;

/// Mapping from bundle name and bundle id to bundle handles.
#[derive(Default)]
pub struct BundleManager {
    by_name: DashMap<String, Arc<BundleHandle>>,
    by_id: DashMap<u32, Arc<BundleHandle>>,
    /// Heartbeat handles, keyed by producer node name.
    by_producer: DashMap<String, Arc<BundleHandle>>,
}

impl BundleManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema bundle. Id 0 is reserved for heartbeats; names and
    /// ids must be unique within one loaded schema.
    pub fn add_bundle(&self, config: &BundleConfig) -> Result<Arc<BundleHandle>> {
        if config.id == crate::HEARTBEAT_ID {
            return Err(Error::InvalidConfig(format!(
                "bundle '{}' uses reserved id 0",
                config.name
            )));
        }
        if self.by_name.contains_key(&config.name) {
            return Err(Error::InvalidConfig(format!(
                "duplicate bundle name '{}'",
                config.name
            )));
        }
        if self.by_id.contains_key(&config.id) {
            return Err(Error::InvalidConfig(format!(
                "duplicate bundle id 0x{:x} ('{}')",
                config.id, config.name
            )));
        }
        let handle = Arc::new(BundleHandle::new(config)?);
        self.by_name.insert(config.name.clone(), Arc::clone(&handle));
        self.by_id.insert(config.id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Register the heartbeat bundle for one producer. Idempotent: a second
    /// registration returns the existing handle.
    pub fn add_heartbeat(&self, producer: &str, consumer: &str) -> Arc<BundleHandle> {
        if let Some(existing) = self.by_producer.get(producer) {
            return Arc::clone(&existing);
        }
        let handle = Arc::new(BundleHandle::heartbeat(producer, consumer));
        self.by_producer
            .insert(producer.to_owned(), Arc::clone(&handle));
        handle
    }

    /// Look up a non-heartbeat bundle by name.
    pub fn bundle(&self, name: &str) -> Result<Arc<BundleHandle>> {
        self.by_name
            .get(name)
            .map(|h| Arc::clone(&h))
            .ok_or_else(|| Error::UnknownBundle(name.to_owned()))
    }

    /// Look up the heartbeat bundle of a producer.
    pub fn heartbeat(&self, producer: &str) -> Result<Arc<BundleHandle>> {
        self.by_producer
            .get(producer)
            .map(|h| Arc::clone(&h))
            .ok_or_else(|| Error::UnknownBundle(format!("{}_heartbeat", producer)))
    }

    /// Snapshot of all non-heartbeat handles.
    #[must_use]
    pub fn bundles(&self) -> Vec<Arc<BundleHandle>> {
        self.by_name.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Snapshot of all heartbeat handles.
    #[must_use]
    pub fn heartbeats(&self) -> Vec<Arc<BundleHandle>> {
        self.by_producer
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Parse a wire bundle and copy its values into the registered handle.
    ///
    /// Id 0 dispatches to `producer`'s heartbeat handle and must carry
    /// exactly one `uint32` signal. Unknown ids and malformed heartbeats
    /// fail without touching any handle.
    pub fn receive(&self, buf: &[u8], producer: &str) -> Result<Arc<BundleHandle>> {
        let id = wire::decode_id(buf)?;

        if id == crate::HEARTBEAT_ID {
            let handle = self
                .by_producer
                .get(producer)
                .map(|h| Arc::clone(&h))
                .ok_or(Error::UnknownBundleId(crate::HEARTBEAT_ID))?;
            let incoming = wire::decode(buf)?;
            let shape_ok = incoming.signals.len() == 1
                && incoming.signals[0]
                    .value
                    .as_ref()
                    .is_some_and(|v| SignalKind::of(v) == SignalKind::Uint32);
            if !shape_ok {
                return Err(Error::Decode(
                    "heartbeat bundle must carry exactly one uint32 signal".into(),
                ));
            }
            handle.assign(incoming);
            return Ok(handle);
        }

        let handle = self
            .by_id
            .get(&id)
            .map(|h| Arc::clone(&h))
            .ok_or(Error::UnknownBundleId(id))?;
        let incoming = wire::decode(buf)?;
        handle.assign(incoming);
        Ok(handle)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn config(yaml: &str) -> BundleConfig {
        serde_yaml::from_str(yaml).expect("bundle yaml")
    }

    fn status_bundle() -> BundleConfig {
        config(
            r#"
name: status
id: 0x100
producer: mcu
consumer: pc
signals:
  - name: voltage
    type: float
  - name: fault
    type: bool
"#,
        )
    }

    #[test]
    fn test_lookup_by_name_and_id() {
        let manager = BundleManager::new();
        let added = manager.add_bundle(&status_bundle()).expect("add");
        let found = manager.bundle("status").expect("lookup");
        assert!(Arc::ptr_eq(&added, &found));
        assert!(matches!(
            manager.bundle("nope"),
            Err(Error::UnknownBundle(_))
        ));
    }

    #[test]
    fn test_reserved_and_duplicate_ids_rejected() {
        let manager = BundleManager::new();
        manager.add_bundle(&status_bundle()).expect("add");
        assert!(manager.add_bundle(&status_bundle()).is_err());

        let reserved = config(
            r#"
name: bad
id: 0
producer: mcu
consumer: pc
"#,
        );
        assert!(matches!(
            manager.add_bundle(&reserved),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_receive_roundtrip() {
        let tx = BundleManager::new();
        let rx = BundleManager::new();
        let sender = tx.add_bundle(&status_bundle()).expect("add tx");
        let receiver = rx.add_bundle(&status_bundle()).expect("add rx");

        sender.signal("voltage").unwrap().set(12.6f32).unwrap();
        sender.signal("fault").unwrap().set(true).unwrap();
        let mut buf = Vec::new();
        sender.encode_into(&mut buf).expect("encode");

        let handle = rx.receive(&buf, "mcu").expect("receive");
        assert!(Arc::ptr_eq(&handle, &receiver));
        assert_eq!(handle.signal("voltage").unwrap().get::<f32>().unwrap(), 12.6);
        assert!(handle.signal("fault").unwrap().get::<bool>().unwrap());
    }

    #[test]
    fn test_receive_unknown_id() {
        let manager = BundleManager::new();
        manager.add_bundle(&status_bundle()).expect("add");
        let stray = wire::Bundle {
            id: 0xDEAD,
            signals: vec![],
        };
        let err = manager
            .receive(&stray.encode_to_vec(), "mcu")
            .expect_err("unknown id must fail");
        assert!(matches!(err, Error::UnknownBundleId(0xDEAD)));
    }

    #[test]
    fn test_heartbeat_dispatch_by_producer() {
        let manager = BundleManager::new();
        let hb = manager.add_heartbeat("mcu", "pc");

        let sender = BundleHandle::heartbeat("mcu", "pc");
        sender.signal("heartbeat").unwrap().set(5u32).unwrap();
        let mut buf = Vec::new();
        sender.encode_into(&mut buf).expect("encode");

        let handle = manager.receive(&buf, "mcu").expect("receive heartbeat");
        assert!(Arc::ptr_eq(&handle, &hb));
        assert_eq!(handle.signal("heartbeat").unwrap().get::<u32>().unwrap(), 5);

        // Same bytes attributed to a producer without a heartbeat handle.
        assert!(matches!(
            manager.receive(&buf, "ghost"),
            Err(Error::UnknownBundleId(0))
        ));
    }

    #[test]
    fn test_heartbeat_shape_enforced() {
        let manager = BundleManager::new();
        manager.add_heartbeat("mcu", "pc");

        let malformed = wire::Bundle {
            id: 0,
            signals: vec![wire::Signal {
                value: Some(wire::signal::Value::String("hi".into())),
            }],
        };
        let err = manager
            .receive(&malformed.encode_to_vec(), "mcu")
            .expect_err("wrong heartbeat shape must fail");
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_add_heartbeat_idempotent() {
        let manager = BundleManager::new();
        let a = manager.add_heartbeat("mcu", "pc");
        let b = manager.add_heartbeat("mcu", "pc");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.heartbeats().len(), 1);
    }
}
