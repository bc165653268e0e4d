// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::unreadable_literal)] // Large test constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::items_after_statements)] // Test helpers

//! End-to-end node scenarios over loopback UDP.
//!
//! Two in-process nodes (`alpha` producing, `beta` consuming) exchange
//! bundles through real sockets: value round-trips, unknown-id handling,
//! callback role gating, and heartbeat liveness promotion/demotion.

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

use proton::{
    BundleConfig, BundleHandle, Error, Node, NodeState, TransportState,
};

/// Each test uses its own port pair so they can run concurrently.
fn config_yaml(port_a: u16, port_b: u16, hb_a: Option<u64>, hb_b: Option<u64>) -> String {
    let hb = |period: Option<u64>| {
        period
            .map(|ms| format!("\n    heartbeat: {{ enabled: true, period_ms: {} }}", ms))
            .unwrap_or_default()
    };
    format!(
        "nodes:
  - name: alpha
    transport: {{ type: udp4, ip: 127.0.0.1, port: {} }}{}
  - name: beta
    transport: {{ type: udp4, ip: 127.0.0.1, port: {} }}{}
bundles:
  - name: value_test
    id: 0x4660
    producer: alpha
    consumer: beta
    signals:
      - name: d
        type: double
      - name: f
        type: float
      - name: i
        type: int32
      - name: b
        type: bool
      - name: s
        type: string
        capacity: 8
      - name: x
        type: bytes
        capacity: 4
      - name: lf
        type: list_float
        length: 2
",
        port_a,
        hb(hb_a),
        port_b,
        hb(hb_b),
    )
}

fn start_node(yaml: &str, name: &str) -> Arc<Node> {
    let config = proton::Config::from_str(yaml).expect("test config should parse");
    let node = Arc::new(Node::new(config, name));
    node.configure().expect("configure should succeed");
    node.activate().expect("activate should succeed");
    node
}

/// Poll until `cond` holds or the deadline passes.
fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

fn wait_connected(node: &Node) {
    assert!(
        wait_for(
            || node
                .peers()
                .iter()
                .all(|p| p.transport().state() == TransportState::Connected),
            Duration::from_secs(2)
        ),
        "peer transports should connect"
    );
}

#[test]
fn test_value_roundtrip_over_udp() {
    let yaml = config_yaml(19011, 19012, None, None);
    let beta = start_node(&yaml, "beta");
    let alpha = start_node(&yaml, "alpha");
    wait_connected(&beta);
    wait_connected(&alpha);

    let (tx, rx) = crossbeam::channel::unbounded();
    beta.register_callback("value_test", move |bundle| {
        let values = (
            bundle.signal("d").unwrap().get::<f64>().unwrap(),
            bundle.signal("f").unwrap().get::<f32>().unwrap(),
            bundle.signal("i").unwrap().get::<i32>().unwrap(),
            bundle.signal("b").unwrap().get::<bool>().unwrap(),
            bundle.signal("s").unwrap().get::<String>().unwrap(),
            bundle.signal("x").unwrap().get::<Vec<u8>>().unwrap(),
            bundle.signal("lf").unwrap().get::<Vec<f32>>().unwrap(),
        );
        tx.send(values).expect("channel send");
    })
    .expect("beta is the consumer");

    let bundle = alpha.bundle("value_test").expect("bundle lookup");
    bundle.signal("d").unwrap().set(1.234f64).unwrap();
    bundle.signal("f").unwrap().set(1.23f32).unwrap();
    bundle.signal("i").unwrap().set(-12i32).unwrap();
    bundle.signal("b").unwrap().set(true).unwrap();
    bundle.signal("s").unwrap().set("test".to_owned()).unwrap();
    bundle.signal("x").unwrap().set(vec![0u8, 1, 2, 3]).unwrap();
    bundle.signal("lf").unwrap().set(vec![0.12f32, 0.23]).unwrap();
    alpha.send_bundle("value_test").expect("send should succeed");

    let received = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("bundle should arrive");
    assert_eq!(received.0, 1.234);
    assert_eq!(received.1, 1.23);
    assert_eq!(received.2, -12);
    assert!(received.3);
    assert_eq!(received.4, "test");
    assert_eq!(received.5, vec![0, 1, 2, 3]);
    assert_eq!(received.6, vec![0.12, 0.23]);

    assert_eq!(bundle.tx_count(), 1);
    assert_eq!(beta.bundle("value_test").unwrap().rx_count(), 1);

    alpha.shutdown();
    beta.shutdown();
}

#[test]
fn test_unknown_id_is_dropped_and_spin_continues() {
    let yaml = config_yaml(19021, 19022, None, None);
    let beta = start_node(&yaml, "beta");
    let alpha = start_node(&yaml, "alpha");
    wait_connected(&beta);
    wait_connected(&alpha);

    let (tx, rx) = crossbeam::channel::unbounded();
    beta.register_callback("value_test", move |bundle| {
        tx.send(bundle.id()).expect("channel send");
    })
    .expect("beta is the consumer");

    // A bundle whose id is in nobody's schema.
    let stray_config: BundleConfig = serde_yaml::from_str(
        "name: stray
id: 0xDEAD
producer: alpha
consumer: beta
signals:
  - name: n
    type: uint32
",
    )
    .expect("stray config");
    let stray = BundleHandle::new(&stray_config).expect("stray bundle");
    let mut buf = Vec::new();
    stray.encode_into(&mut buf).expect("encode stray");
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind raw socket");
    socket
        .send_to(&buf, "127.0.0.1:19022")
        .expect("send stray bytes");

    // No callback fires for the unknown id.
    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err());

    // The spin loop keeps going: a valid bundle still arrives.
    alpha.send_bundle("value_test").expect("send valid bundle");
    let id = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("valid bundle should still arrive");
    assert_eq!(id, 0x4660);

    alpha.shutdown();
    beta.shutdown();
}

#[test]
fn test_callback_gated_by_consumer_role() {
    let yaml = config_yaml(19031, 19032, None, None);
    let config = proton::Config::from_str(&yaml).expect("config");
    let alpha = Arc::new(Node::new(config.clone(), "alpha"));
    alpha.configure().expect("configure alpha");

    // alpha produces value_test; registering a consumer callback there is
    // refused and nothing is stored.
    let err = alpha
        .register_callback("value_test", |_| {})
        .expect_err("producer must not register a consumer callback");
    assert!(matches!(err, Error::NotConsumer { .. }));

    let beta = Arc::new(Node::new(config, "beta"));
    beta.configure().expect("configure beta");
    beta.register_callback("value_test", |_| {})
        .expect("consumer registration succeeds");
}

#[test]
fn test_lifecycle_transitions_are_hard_errors() {
    let yaml = config_yaml(19041, 19042, None, None);
    let config = proton::Config::from_str(&yaml).expect("config");
    let node = Arc::new(Node::new(config, "alpha"));
    assert_eq!(node.state(), NodeState::Unconfigured);

    // Activate before configure.
    assert!(matches!(
        node.activate(),
        Err(Error::InvalidStateTransition(_))
    ));

    node.configure().expect("first configure");
    assert_eq!(node.state(), NodeState::Inactive);
    assert!(matches!(
        node.configure(),
        Err(Error::InvalidStateTransition(_))
    ));

    // Send before activate.
    assert!(matches!(
        node.send_bundle("value_test"),
        Err(Error::InvalidState(_))
    ));

    node.activate().expect("first activate");
    assert_eq!(node.state(), NodeState::Active);
    assert!(matches!(
        node.activate(),
        Err(Error::InvalidStateTransition(_))
    ));

    node.shutdown();
}

#[test]
fn test_heartbeat_liveness_promotion_and_demotion() {
    // Only beta runs in-process; alpha's heartbeats are spoofed raw bytes
    // so the test controls their timing exactly.
    let yaml = config_yaml(19051, 19052, Some(500), None);
    let beta = start_node(&yaml, "beta");
    wait_connected(&beta);
    let peers = beta.peers();
    let peer = &peers[0];
    assert_eq!(peer.name(), "alpha");
    assert_eq!(peer.state(), NodeState::Inactive);

    let hb = BundleHandle::heartbeat("alpha", "beta");
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind raw socket");
    let mut buf = Vec::new();
    let mut send_heartbeat = |count: u32| {
        hb.signal("heartbeat").unwrap().set(count).unwrap();
        hb.encode_into(&mut buf).expect("encode heartbeat");
        socket
            .send_to(&buf, "127.0.0.1:19052")
            .expect("send heartbeat bytes");
    };

    // t ~ 0.1s: first heartbeat promotes the peer.
    send_heartbeat(1);
    assert!(
        wait_for(|| peer.state() == NodeState::Active, Duration::from_secs(1)),
        "heartbeat receipt should promote the peer"
    );
    assert!(peer.last_heartbeat().is_some());

    // No further heartbeats: the 1 Hz liveness tick demotes once the gap
    // exceeds the 500 ms period.
    assert!(
        wait_for(
            || peer.state() == NodeState::Inactive,
            Duration::from_secs(3)
        ),
        "silent peer should be demoted"
    );

    // A later heartbeat promotes it again and restamps the time.
    let before = Instant::now();
    send_heartbeat(2);
    assert!(
        wait_for(|| peer.state() == NodeState::Active, Duration::from_secs(1)),
        "heartbeat receipt should re-promote the peer"
    );
    let stamp = peer.last_heartbeat().expect("stamp after re-promotion");
    assert!(stamp >= before, "stamp should be refreshed");

    beta.shutdown();
}

#[test]
fn test_automatic_heartbeat_emission() {
    let yaml = config_yaml(19061, 19062, Some(100), None);
    let beta = start_node(&yaml, "beta");
    let alpha = start_node(&yaml, "alpha");
    wait_connected(&beta);
    wait_connected(&alpha);

    let (tx, rx) = crossbeam::channel::unbounded();
    beta.register_heartbeat_callback("alpha", move |bundle| {
        let count = bundle.signal("heartbeat").unwrap().get::<u32>().unwrap();
        tx.send(count).expect("channel send");
    })
    .expect("beta consumes alpha's heartbeat");

    // alpha's own produced-heartbeat handle is consumed by beta, so alpha
    // cannot register on it.
    assert!(matches!(
        alpha.register_heartbeat_callback("alpha", |_| {}),
        Err(Error::NotConsumer { .. })
    ));

    let first = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("heartbeats should arrive");
    let second = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("heartbeats should keep arriving");
    assert!(second > first, "counter must increase: {} -> {}", first, second);

    assert!(
        wait_for(
            || beta.peers()[0].state() == NodeState::Active,
            Duration::from_secs(1)
        ),
        "alpha should be promoted by its own heartbeats"
    );

    alpha.shutdown();
    beta.shutdown();
}
