//! # Sortline Supervisor
//!
//! Headless runner for the inspection-and-sorting station. Loads
//! `station.toml`, assembles the control core, arms it, and runs until
//! Ctrl+C, then drives the bounded shutdown path.
//!
//! The control loops are plain threads inside `sortline_control`; the
//! async runtime here exists only for signal handling.

use clap::Parser;
use sortline_common::config::{ConfigLoader, StationConfig};
use sortline_common::events::StationEvent;
use sortline_control::Station;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc::Receiver;
use tokio::signal;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

/// Sortline — visual inspection and sorting station
#[derive(Parser, Debug)]
#[command(name = "sortline")]
#[command(version)]
#[command(about = "Control core for the inspection-and-sorting station")]
struct Args {
    /// Path to the station configuration TOML.
    #[arg(default_value = "config/station.toml")]
    config: PathBuf,

    /// Arm detection and start the conveyor immediately.
    #[arg(long)]
    arm: bool,

    /// Conveyor speed in percent when `--arm` is given.
    #[arg(long, default_value_t = 60)]
    conveyor_speed: u8,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Sortline v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args).await {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Sortline shutdown complete");
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match StationConfig::load(&args.config) {
        Ok(config) => config,
        Err(sortline_common::config::ConfigError::FileNotFound) => {
            warn!(
                "no configuration at {}, using built-in defaults (simulation mode)",
                args.config.display()
            );
            StationConfig::default()
        }
        Err(e) => return Err(Box::new(e)),
    };

    let (mut station, events) = Station::new(config)?;
    station.start();

    if args.arm {
        station.set_conveyor(
            args.conveyor_speed,
            sortline_common::hal::types::ConveyorDirection::Forward,
        )?;
        station.arm(true);
    }

    // Event stream goes to the log; a display layer would subscribe
    // here instead.
    let drain = std::thread::spawn(move || drain_events(events));

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal (Ctrl+C)"),
        Err(e) => error!("unable to listen for shutdown signal: {e}"),
    }

    station.shutdown();
    drop(station); // closes the event stream, ending the drain thread
    if drain.join().is_err() {
        warn!("event drain thread panicked");
    }
    Ok(())
}

/// Log station events until the sending side is gone.
fn drain_events(events: Receiver<StationEvent>) {
    for event in events {
        match event {
            StationEvent::SensorTriggered => info!("part detected"),
            StationEvent::DetectionResult {
                classification,
                defect_kind,
                confidence,
            } => match defect_kind {
                Some(kind) => {
                    info!("verdict: {classification:?}/{kind:?} (confidence {confidence:.2})")
                }
                None => info!("verdict: {classification:?} (confidence {confidence:.2})"),
            },
            StationEvent::ActionCompleted { target, success } => {
                if success {
                    info!("part routed to {target:?} chute");
                } else {
                    warn!("sorting toward {target:?} failed, part passed through");
                }
            }
            StationEvent::FrameReady(frame) => {
                trace!("frame {}x{}", frame.width, frame.height);
            }
        }
    }
    debug!("event stream closed");
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
