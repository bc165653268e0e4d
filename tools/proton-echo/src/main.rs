// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! proton-echo - run a node from a YAML schema and echo what it hears.
//!
//! Registers a printing callback on every bundle the node consumes and
//! refreshes a stats table (peer states, KB/s, per-bundle hz) once a
//! second, like the stock example programs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use proton::{Error, Node, NodeStats, Result};

/// Run a Proton node and echo its consumed bundles
#[derive(Parser, Debug)]
#[command(name = "proton-echo")]
#[command(version)]
#[command(about = "Echo Proton bundles in real-time")]
struct Args {
    /// Path to the YAML schema configuration
    config: PathBuf,

    /// Name of the node to run (must appear in the schema)
    node: String,

    /// Echo only the named bundle
    #[arg(short, long)]
    bundle: Option<String>,

    /// Stats table refresh period in seconds
    #[arg(short, long, default_value = "1")]
    refresh: u64,

    /// Quiet mode - echo bundles only, no stats table
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let node = Arc::new(Node::from_config_file(&args.config, &args.node)?);
    node.configure()?;

    for handle in node.manager().bundles() {
        if handle.consumer() != args.node {
            continue;
        }
        if args.bundle.as_deref().is_some_and(|b| b != handle.name()) {
            continue;
        }
        node.register_callback(handle.name(), |bundle| {
            println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), bundle);
        })?;
    }

    node.activate()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .map_err(|e| Error::InvalidState(format!("signal handler: {}", e)))?;

    let refresh = Duration::from_secs(args.refresh.max(1));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(refresh);
        if !args.quiet {
            print_stats(&node.stats());
        }
    }

    node.shutdown();
    Ok(())
}

fn print_stats(stats: &NodeStats) {
    // Clear screen and home the cursor, like the stock stats threads.
    print!("\x1b[2J\x1b[1;1H");
    println!("--------- Proton Node ----------");
    println!("Node: {} ({})", stats.name, stats.state);
    println!("Rx: {:.3} KB/s  Tx: {:.3} KB/s", stats.rx_kbps, stats.tx_kbps);
    for peer in &stats.peers {
        println!(
            "Peer: {}  state={} transport={}",
            peer.name, peer.state, peer.transport
        );
    }
    println!("----- Produced Bundles (hz) ----");
    for bundle in &stats.bundles {
        if bundle.producer == stats.name {
            println!("{}: {}", bundle.name, bundle.txps);
        }
    }
    println!("----- Consumed Bundles (hz) ----");
    for bundle in &stats.bundles {
        if bundle.consumer == stats.name {
            println!("{}: {}", bundle.name, bundle.rxps);
        }
    }
    println!("------- Heartbeats (hz) --------");
    for heartbeat in &stats.heartbeats {
        if heartbeat.consumer == stats.name {
            println!("{}: {}", heartbeat.producer, heartbeat.rxps);
        }
    }
    println!("--------------------------------");
}
