//! SlotKV Simulator
//!
//! Drives a store against the in-memory host: writes a batch of items,
//! optionally destroys a unit behind the store's back, and prints stats.

use std::sync::Arc;

use clap::Parser;
use slotkv::host::{MemoryHostOptions, Subscription};
use slotkv::{Config, Item, MemoryHost, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// SlotKV Simulator
#[derive(Parser, Debug)]
#[command(name = "slotkv-sim")]
#[command(about = "Run a SlotKV store against a simulated host")]
#[command(version)]
struct Args {
    /// JSON config file (flags below override it)
    #[arg(short, long)]
    config: Option<String>,

    /// Store identifier (owner tag)
    #[arg(short, long)]
    store_id: Option<String>,

    /// Slots per simulated unit
    #[arg(long, default_value = "27")]
    capacity: usize,

    /// Number of items to write
    #[arg(short = 'n', long, default_value = "64")]
    items: usize,

    /// Destroy the first unit externally after writing
    #[arg(long)]
    vanish_first: bool,

    /// Print stats as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slotkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("SlotKV Simulator v{}", slotkv::VERSION);

    let mut config = match &args.config {
        Some(path) => match Config::from_json_file(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(id) = &args.store_id {
        config.store_id = id.clone();
    }

    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        capacity: args.capacity,
        ..MemoryHostOptions::default()
    }));
    let mut events = host.bus().subscribe();

    let store = match Store::new(config, Arc::clone(&host)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create store: {}", e);
            std::process::exit(1);
        }
    };

    host.announce_ready();
    pump(&store, &mut events).await;

    let mut stored = 0;
    for i in 0..args.items {
        let item = Item::new(format!("payload-{}", i)).with_label(format!("item #{}", i));
        match store.set_item(item, &format!("item-{:05}", i)).await {
            Ok(true) => stored += 1,
            Ok(false) => tracing::warn!("Item {} not stored", i),
            Err(e) => {
                tracing::error!("Store failure: {}", e);
                std::process::exit(1);
            }
        }
        pump(&store, &mut events).await;
    }
    tracing::info!("Stored {}/{} items", stored, args.items);

    if args.vanish_first {
        if let Some(unit) = store.unit_ids().first() {
            host.vanish(unit);
            pump(&store, &mut events).await;
        }
    }

    let stats = store.stats();
    if args.json {
        match serde_json::to_string_pretty(&stats) {
            Ok(out) => println!("{}", out),
            Err(e) => tracing::error!("Cannot encode stats: {}", e),
        }
    } else {
        println!(
            "units={} items={} occupied={}/{}",
            stats.units, stats.items, stats.occupied_slots, stats.total_capacity
        );
    }
}

/// Deliver every queued host event to the store
async fn pump(store: &Store<MemoryHost>, events: &mut Subscription) {
    while let Some(event) = events.try_recv() {
        if let Err(e) = store.handle_event(event).await {
            tracing::error!("Event handling failed: {}", e);
        }
    }
}
