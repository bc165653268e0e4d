// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated MCU side of the a300 sample schema: streams `status` at
//! 10 Hz, heartbeats per its schema entry, and echoes incoming `cmd_vel`.
//!
//! Run together with `pc_monitor`:
//!
//! ```text
//! cargo run --example mcu_sim -- crates/proton/examples/a300.yaml
//! ```

use std::sync::Arc;
use std::time::Duration;

use proton::{Node, Result};

fn main() -> Result<()> {
    let config = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "crates/proton/examples/a300.yaml".to_owned());

    let node = Arc::new(Node::from_config_file(&config, "mcu")?);
    node.configure()?;

    node.register_callback("cmd_vel", |bundle| {
        if let Ok(v) = bundle.signal("velocities").and_then(|s| s.get::<Vec<f64>>()) {
            println!("cmd_vel: {:?}", v);
        }
    })?;

    node.activate()?;

    let status = node.bundle("status")?;
    let mut tick = 0u32;
    loop {
        let jitter = (tick % 10) as f32 * 0.01;
        status.signal("voltage")?.set(24.0f32 + jitter)?;
        status.signal("temperature")?.set(31.5f32 + jitter)?;
        if let Err(e) = node.send_bundle("status") {
            eprintln!("send status: {}", e);
        }
        tick = tick.wrapping_add(1);
        std::thread::sleep(Duration::from_millis(100));
    }
}
