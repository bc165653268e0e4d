// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PC side of the a300 sample schema: prints incoming `status` bundles
//! and MCU heartbeats, sends a `cmd_vel` each second, and reports peer
//! liveness.
//!
//! ```text
//! cargo run --example pc_monitor -- crates/proton/examples/a300.yaml
//! ```

use std::sync::Arc;
use std::time::Duration;

use proton::{Node, Result};

fn main() -> Result<()> {
    let config = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "crates/proton/examples/a300.yaml".to_owned());

    let node = Arc::new(Node::from_config_file(&config, "pc")?);
    node.configure()?;

    node.register_callback("status", |bundle| {
        println!("{}", bundle);
    })?;
    node.register_heartbeat_callback("mcu", |heartbeat| {
        if let Ok(count) = heartbeat.signal("heartbeat").and_then(|s| s.get::<u32>()) {
            println!("mcu heartbeat #{}", count);
        }
    })?;

    node.activate()?;

    let cmd_vel = node.bundle("cmd_vel")?;
    loop {
        std::thread::sleep(Duration::from_secs(1));

        cmd_vel.signal("velocities")?.set(vec![0.5f64, 0.0])?;
        if let Err(e) = node.send_bundle("cmd_vel") {
            eprintln!("send cmd_vel: {}", e);
        }

        let stats = node.stats();
        for peer in &stats.peers {
            println!(
                "peer {}: {} (transport {}) rx {:.3} KB/s",
                peer.name, peer.state, peer.transport, stats.rx_kbps
            );
        }
    }
}
