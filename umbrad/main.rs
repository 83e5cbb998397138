//! The umbra node daemon: opens the block store, drives the core and shuts
//! down cleanly on SIGINT/SIGTERM.

#[macro_use]
extern crate log;

extern crate umbra_core;
extern crate umbra_db;
extern crate umbra_network;
extern crate umbra_storage;
extern crate umbra_verification;

mod signal_handler;

use clap::Parser;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use umbra_core::{BlockchainMessage, Core, QueueError};
use umbra_db::{PersistentSegment, Segment};
use umbra_network::Network;
use umbra_storage::BlockchainStorage;
use umbra_verification::Checkpoints;

const POOL_CLEANING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "umbrad", about = "Umbra currency node", version)]
struct Options {
    /// Directory holding the block store and the root segment cache.
    #[arg(long, default_value = "umbra-data")]
    data_dir: PathBuf,
    /// Use the test network.
    #[arg(long)]
    testnet: bool,
    /// Log filter, e.g. `info` or `core=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let options = Options::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        options.log_level.clone(),
    ))
    .init();

    if let Err(message) = run(options) {
        error!(target: "umbrad", "{}", message);
        exit(1);
    }
}

fn run(options: Options) -> Result<(), String> {
    let network = if options.testnet {
        Network::Testnet
    } else {
        Network::Mainnet
    };
    let currency = network.currency();

    std::fs::create_dir_all(&options.data_dir)
        .map_err(|err| format!("cannot create data dir: {}", err))?;
    let storage = BlockchainStorage::swapped(
        &options.data_dir.join("blockindexes.dat"),
        &options.data_dir.join("blocks.dat"),
    )
    .map_err(|err| format!("cannot open block storage: {}", err))?;
    let root_segment = PersistentSegment::load(&options.data_dir.join("rootcache.dat"))
        .map_err(|err| format!("cannot open root segment cache: {}", err))?;

    let core = Arc::new(Core::new(
        currency,
        Checkpoints::new(),
        storage,
        Segment::Persistent(root_segment),
    ));
    core.load()
        .map_err(|err| format!("cannot initialize blockchain core: {}", err))?;
    info!(
        target: "umbrad",
        "core loaded, top block height {}",
        core.top_block_height().map_err(|err| err.to_string())?
    );

    core.start_pool_cleaner(POOL_CLEANING_INTERVAL);

    // drain core events into the log until shutdown stops the queue
    let events = core.make_queue();
    let drain_queue = events.clone();
    let drain = std::thread::Builder::new()
        .name("event-drain".into())
        .spawn(move || loop {
            match drain_queue.pop() {
                Ok(message) => log_event(&message),
                Err(QueueError::Stopped) => break,
                Err(_) => break,
            }
        })
        .map_err(|err| format!("cannot spawn event thread: {}", err))?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = stop_flag.clone();
    signal_handler::install(Box::new(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }));

    info!(target: "umbrad", "node is running, send SIGINT or SIGTERM to stop");
    while !stop_flag.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!(target: "umbrad", "shutting down");
    core.shutdown();
    events.stop();
    let _ = drain.join();
    core.save()
        .map_err(|err| format!("cannot save blockchain state: {}", err))?;

    info!(target: "umbrad", "clean shutdown");
    Ok(())
}

fn log_event(message: &BlockchainMessage) {
    match message {
        BlockchainMessage::NewBlock { height, hash } => {
            debug!(target: "umbrad", "new block {} at height {}", hash, height);
        }
        BlockchainMessage::NewAlternativeBlock { height, hash } => {
            debug!(target: "umbrad", "new alternative block {} at height {}", hash, height);
        }
        BlockchainMessage::ChainSwitch {
            common_root_height,
            hashes_on_new_branch,
        } => {
            info!(
                target: "umbrad",
                "chain switched at height {}, {} blocks on the new branch",
                common_root_height,
                hashes_on_new_branch.len()
            );
        }
        BlockchainMessage::AddTransaction { hashes } => {
            debug!(target: "umbrad", "{} transactions added to pool", hashes.len());
        }
        BlockchainMessage::DeleteTransaction { hashes, reason } => {
            debug!(
                target: "umbrad",
                "{} transactions removed from pool ({:?})",
                hashes.len(),
                reason
            );
        }
    }
}
