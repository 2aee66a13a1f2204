mod bridge;
mod cache;
mod config;
mod cot;
mod decoder;
mod engine;
mod error;
mod extractor;
mod matcher;
mod multicast;
mod remarks;
mod spoof;
mod zmq_feed;

use std::time::Duration;

use clap::Parser;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use config::EngineConfig;
use engine::{run_engine, Engine, EngineEvent};
use multicast::run_multicast;
use zmq_feed::{run_subscriber, FeedKind};

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "dronewatch-backend",
    about = "Remote-ID ingestion, normalization and correlation engine"
)]
struct Args {
    /// Config file path (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,
    /// Disable the UDP multicast listener
    #[arg(long)]
    no_multicast: bool,
    /// Disable the ZeroMQ telemetry/status feeds
    #[arg(long)]
    no_zmq: bool,
}

// ─── Event log task ───────────────────────────────────────────────────────────

/// Default collaborator: mirrors engine events onto the log. External
/// consumers subscribe to the same broadcast channel.
async fn log_events(
    mut events: broadcast::Receiver<EngineEvent>,
    mut running: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(EngineEvent::DroneDetected(update)) => {
                    info!(
                        "🛸 new emitter {} via {:?} at ({:.5}, {:.5})",
                        update.signature.primary_id.id,
                        update.signature.transmission_info.transmission_type,
                        update.signature.position.coordinate.lat,
                        update.signature.position.coordinate.lon,
                    );
                }
                Ok(EngineEvent::DroneUpdated(update)) => {
                    debug!(
                        "emitter {} updated (match {:?})",
                        update.signature.primary_id.id, update.match_strength
                    );
                }
                Ok(EngineEvent::ProximityAlert(ring)) => {
                    info!(
                        "📶 {} heard at {} dBm — within ~{:.0} m",
                        ring.drone_id, ring.rssi, ring.radius_m
                    );
                }
                Ok(EngineEvent::StatusUpdated(status)) => {
                    debug!(
                        "monitor {}: cpu {:.1}%, temp {:.1}°C",
                        status.uid, status.system.cpu_usage, status.system.temperature
                    );
                }
                Ok(EngineEvent::Connectivity { transport, connected }) => {
                    info!("{transport}: connected={connected}");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("event log lagged, {missed} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = running.changed() => {
                if !*running.borrow() {
                    break;
                }
            }
        }
    }
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dronewatch_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = EngineConfig::load(args.config.as_deref());

    info!("🛰  DroneWatch backend starting...");

    let (running_tx, running_rx) = watch::channel(true);
    let (frames_tx, frames_rx) = mpsc::channel::<Vec<u8>>(1024);
    let (events_tx, events_rx) = broadcast::channel::<EngineEvent>(256);

    let engine = Engine::new(events_tx.clone(), cfg.fallback_ua_type);
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(run_engine(
        frames_rx,
        engine,
        running_rx.clone(),
    )));
    tasks.push(tokio::spawn(log_events(events_rx, running_rx.clone())));

    if !args.no_multicast {
        tasks.push(tokio::spawn(run_multicast(
            cfg.clone(),
            frames_tx.clone(),
            running_rx.clone(),
            events_tx.clone(),
        )));
    }
    if !args.no_zmq {
        let recv_timeout = Duration::from_millis(cfg.recv_timeout_ms);
        let retry = Duration::from_secs(cfg.reconnect_interval_secs);
        tasks.push(tokio::spawn(run_subscriber(
            FeedKind::Telemetry,
            cfg.telemetry_endpoint(),
            recv_timeout,
            retry,
            frames_tx.clone(),
            running_rx.clone(),
            events_tx.clone(),
        )));
        tasks.push(tokio::spawn(run_subscriber(
            FeedKind::Status,
            cfg.status_endpoint(),
            recv_timeout,
            retry,
            frames_tx.clone(),
            running_rx.clone(),
            events_tx.clone(),
        )));
    }

    // transports hold their own clones
    drop(frames_tx);
    drop(events_tx);

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = running_tx.send(false);
    for task in tasks {
        let _ = task.await;
    }
    info!("DroneWatch backend stopped");
    Ok(())
}
