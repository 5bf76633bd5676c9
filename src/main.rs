//! Garage control - automated parking garage controller
//!
//! Drives the garage hardware over TCP and coordinates reservations, entry
//! and exit sequencing, fee settlement and receipt egress.
//!
//! Module structure:
//! - `domain/` - Core business types (Reservation, Payment, GarageState)
//! - `io/` - External interfaces (protocol codec, TCP connection, egress)
//! - `services/` - Business logic (GarageManager, Orchestrator, Allocator, Fees)
//! - `infra/` - Infrastructure (Config)

use clap::Parser;
use garage_control::infra::Config;
use garage_control::io::{GarageConnection, ReceiptEgress};
use garage_control::services::allocator::run_allocator;
use garage_control::services::fees::run_payment_service;
use garage_control::services::{
    GarageManager, ParkingOrchestrator, ReservationAllocator,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Garage control - automated parking garage controller
#[derive(Parser, Debug)]
#[command(name = "garage-control", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("garage-control starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        garage_host = %config.garage_host(),
        capacity = %config.capacity(),
        egress_file = %config.egress_file(),
        first_free_scan = %config.first_free_scan(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Connect to the garage hardware
    let connection = Arc::new(GarageConnection::new());
    if !connection.connect(config.garage_host()).await {
        anyhow::bail!("could not connect to garage at {}", config.garage_host());
    }

    let manager = Arc::new(GarageManager::new(connection, config.capacity()));
    let timings = manager.timings().clone();

    // Channels between the services
    let (garage_event_tx, garage_event_rx) = mpsc::channel(64);
    let (kiosk_tx, mut kiosk_rx) = mpsc::channel(config.kiosk_queue_depth());
    let (parking_tx, parking_rx) = mpsc::channel(64);
    let (allocator_tx, allocator_rx) = mpsc::channel(64);
    let (payment_tx, payment_rx) = mpsc::channel(64);

    // Allocator service
    let allocator = ReservationAllocator::new(config.capacity())
        .with_first_free_scan(config.first_free_scan());
    tokio::spawn(run_allocator(allocator, allocator_rx, kiosk_tx.clone()));

    // Payment service
    tokio::spawn(run_payment_service(payment_rx, parking_tx.clone(), kiosk_tx.clone()));

    // Orchestrator
    let egress = ReceiptEgress::new(config.egress_file());
    let orchestrator = Arc::new(ParkingOrchestrator::new(
        manager.clone(),
        kiosk_tx,
        allocator_tx,
        payment_tx,
        Some(egress),
        timings,
    ));
    if !orchestrator.initialize().await {
        anyhow::bail!("garage initialization failed");
    }
    tokio::spawn(orchestrator.run(parking_rx, garage_event_rx, shutdown_rx.clone()));

    // Kiosk drain: the UI collaborator is external, log what it would show
    tokio::spawn(async move {
        while let Some(event) = kiosk_rx.recv().await {
            info!(event = ?event, "kiosk_event");
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the poll loop in the foreground - it ends on shutdown or disconnect
    manager.run_poll_loop(garage_event_tx, shutdown_rx).await;

    info!("garage-control shutdown complete");
    Ok(())
}
