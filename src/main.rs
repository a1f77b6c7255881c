use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use matchbook::config::Settings;
use matchbook::engine::MatchingEngine;
use matchbook::persistence::event_log::EventLog;
use matchbook::persistence::snapshot::SnapshotManager;
use matchbook::protocol::ProtocolHandler;
use matchbook::risk::RiskChecker;

#[derive(Parser, Debug)]
#[command(name = "matchbook")]
struct Args {
    /// Append-only event log path. Omit to run without durability.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Snapshot directory. Omit to disable snapshots.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Settings file overriding risk limits and the snapshot interval.
    #[arg(long)]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // responses own stdout; everything else goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let event_log = match &args.event_log {
        Some(path) => EventLog::open(path)?,
        None => EventLog::disabled(),
    };
    let snapshots = match &args.snapshot_dir {
        Some(dir) => SnapshotManager::open(dir, settings.snapshot_interval)?,
        None => SnapshotManager::disabled(),
    };

    let mut engine = MatchingEngine::new(event_log, snapshots, RiskChecker::new(settings.risk));
    if engine.recover()? {
        info!("recovered engine state from existing log");
    } else {
        info!("starting with empty state");
    }

    let mut handler = ProtocolHandler::new(engine);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    info!("ready, reading commands from stdin");
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handler.handle(&line);
        writeln!(out, "{}", reply.line)?;
        out.flush()?;
        if reply.shutdown {
            info!("shutdown requested");
            break;
        }
    }

    info!("exiting");
    Ok(())
}
