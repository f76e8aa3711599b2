//! aw-watcher-terminal entrypoint.
//!
//! A single-writer service: shell hooks write lifecycle notifications into a
//! named pipe, the watcher reorders them by timestamp and turns each
//! `exec`/`result` pair into one command event in ActivityWatch.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info, warn};

mod config;
mod delay_queue;
mod emitter;
mod fifo;
mod logging;
mod record;
mod session;
mod watcher;

use config::{Overrides, ACTIVITY_EVENT_TYPE, COMMANDS_EVENT_TYPE};
use emitter::{AwClient, Emitter};
use fifo::FifoReader;
use session::SessionMachine;
use watcher::{SystemClock, Watcher};

#[derive(Parser)]
#[command(name = "aw-watcher-terminal")]
#[command(about = "Terminal activity watcher for ActivityWatch")]
#[command(version)]
struct Cli {
    /// Talk to the testing server (port 5666)
    #[arg(long)]
    testing: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Config file (defaults to the ActivityWatch config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Named pipe the shell hooks write to
    #[arg(long, value_name = "PATH")]
    pipe_path: Option<PathBuf>,

    /// ActivityWatch server host
    #[arg(long)]
    host: Option<String>,

    /// ActivityWatch server port
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("aw-watcher-terminal: {}", err);
            std::process::exit(1);
        }
    };
    config.apply(Overrides {
        testing: cli.testing,
        verbose: cli.verbose,
        pipe_path: cli.pipe_path,
        host: cli.host,
        port: cli.port,
    });

    let _logging_guard = logging::init(config.verbose);

    if let Err(err) = config.validate() {
        error!(error = %err, "Invalid configuration");
        std::process::exit(1);
    }

    info!(
        server = %config.server_url(),
        testing = config.testing,
        "Starting aw-watcher-terminal"
    );

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            warn!(signal, error = %err, "Failed to install stop handler");
        }
    }

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let client = AwClient::new(
        &config.server_url(),
        &config.client_id,
        &hostname,
        StdDuration::from_secs(config.server.timeout_secs),
    );
    let buckets = config.bucket_ids(&hostname);

    for (bucket_id, event_type) in [
        (&buckets.commands, COMMANDS_EVENT_TYPE),
        (&buckets.activity, ACTIVITY_EVENT_TYPE),
    ] {
        if let Err(err) = client.create_bucket(bucket_id, event_type) {
            error!(bucket = %bucket_id, error = %err, "Failed to create bucket");
            std::process::exit(1);
        }
        info!(bucket = %bucket_id, "Bucket ready");
    }

    let pipe_path = match config.resolve_pipe_path() {
        Some(path) => path,
        None => {
            error!("Failed to resolve pipe path");
            std::process::exit(1);
        }
    };
    if let Err(err) = fifo::setup_named_pipe(&pipe_path) {
        error!(error = %err, "Failed to create named pipe");
        std::process::exit(1);
    }
    let mut reader = match FifoReader::open(&pipe_path) {
        Ok(reader) => reader,
        Err(err) => {
            error!(error = %err, "Failed to open named pipe");
            std::process::exit(1);
        }
    };

    let machine = SessionMachine::new(client, buckets, config.pulsetime());
    let mut watcher = Watcher::new(machine, SystemClock, config.queue_window());
    watcher.run(&mut reader, config.poll_interval(), &stop);

    if let Err(err) = fs_err::remove_file(&pipe_path) {
        warn!(error = %err, "Failed to remove named pipe");
    }
}
