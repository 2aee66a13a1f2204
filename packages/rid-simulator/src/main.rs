//! main.rs — Remote-ID traffic simulator entry point
//!
//! Drives N synthetic drone tracks plus a ground-sensor status beacon at a
//! fixed rate over UDP, in any of the wire formats the engine ingests.
//! Useful for bench-testing the decode → correlate → emit pipeline without
//! radio hardware.

mod generator;
mod udp_tx;

use std::time::Duration;

use clap::Parser;
use tokio::time::interval;
use tracing::info;

use generator::{status_json, DroneTrack, Format};
use udp_tx::UdpTransmitter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rid-sim", about = "DroneWatch synthetic Remote-ID traffic generator")]
struct Args {
    /// Engine address for unicast frames
    #[arg(long, default_value = "127.0.0.1:6969")]
    target: String,
    /// Also send to the 224.0.0.1:6969 multicast group
    #[arg(long)]
    multicast: bool,
    /// Frames per second across all tracks
    #[arg(long, default_value = "5.0")]
    rate: f64,
    /// Number of simulated drones
    #[arg(long, default_value = "3")]
    drones: usize,
    /// Wire format: cot, esp32, ble, wifi, or mixed
    #[arg(long, default_value = "mixed")]
    format: String,
    /// Make one track teleport to exercise spoof detection
    #[arg(long)]
    spoof: bool,
    /// Status beacon period, seconds (0 disables)
    #[arg(long, default_value = "5.0")]
    status_period: f64,
}

fn format_for(name: &str, index: usize) -> Format {
    match name {
        "cot" => Format::Cot,
        "esp32" => Format::Esp32,
        "ble" => Format::Ble,
        "wifi" => Format::Wifi,
        // mixed: spread the formats across tracks
        _ => [Format::Cot, Format::Esp32, Format::Ble, Format::Wifi][index % 4],
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rid_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let mc_addr = args.multicast.then_some("224.0.0.1:6969");
    let transmitter =
        UdpTransmitter::new(&args.target, mc_addr).expect("Failed to bind UDP socket");

    let mut tracks: Vec<DroneTrack> = (0..args.drones)
        .map(|i| DroneTrack::random(i, args.spoof && i == 0))
        .collect();

    info!(
        "🛩  rid-sim: {} tracks at {} fps → {} (format {})",
        args.drones, args.rate, args.target, args.format
    );
    if args.spoof {
        info!("⚠  track 0 is spoofed (teleporting)");
    }

    let tick_period = Duration::from_secs_f64(1.0 / args.rate.max(0.1));
    let mut ticker = interval(tick_period);
    let mut elapsed = 0.0_f64;
    let mut last_status = 0.0_f64;
    let monitor = (40.7000, -74.0000);

    loop {
        ticker.tick().await;
        let dt = tick_period.as_secs_f64();
        elapsed += dt;

        for (i, track) in tracks.iter_mut().enumerate() {
            track.tick(dt);
            let frame = track.render(format_for(&args.format, i));
            transmitter.send_frame(&frame);
        }

        if args.status_period > 0.0 && elapsed - last_status >= args.status_period {
            last_status = elapsed;
            let frame = status_json("wardragon-sim", monitor.0, monitor.1, elapsed);
            transmitter.send_frame(&frame);
        }
    }
}
