//! Garage state manager - typed commands and the polling loop
//!
//! Wraps the connection with typed command helpers (ack is the literal `OK`)
//! and holds the current hardware snapshot behind a `RwLock`. The poll loop
//! is the snapshot's single writer; every tick replaces it wholesale.
//!
//! Beam events are level-triggered on the decoded value, not edge-triggered:
//! a vehicle sitting on the entry beam re-fires `VehicleAtEntry` every tick.
//! The kiosk collaborator depends on the repeated notification.

use crate::domain::types::{GarageEvent, GarageState, LightState};
use crate::io::connection::GarageConnection;
use crate::io::protocol::{self, Command};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Fixed timing constants for the garage loops. Defaults are the deployed
/// values; tests construct compressed timings directly.
#[derive(Debug, Clone)]
pub struct GarageTimings {
    /// Period of the state poll loop
    pub poll_period: Duration,
    /// Time a vehicle gets to pass through an open gate
    pub grace_window: Duration,
    /// Delay between occupancy re-reads while guiding a vehicle to its spot
    pub spot_poll_tick: Duration,
    /// Number of occupancy re-reads before declaring a wrong-spot park
    pub spot_poll_attempts: u32,
}

impl Default for GarageTimings {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(5),
            grace_window: Duration::from_secs(10),
            spot_poll_tick: Duration::from_millis(1),
            spot_poll_attempts: 6,
        }
    }
}

/// Command/snapshot surface of the garage, as seen by the orchestrator.
/// Implemented by `GarageManager` for the real hardware and by a recording
/// mock in tests.
#[async_trait]
pub trait GarageControl: Send + Sync {
    async fn is_connected(&self) -> bool;
    async fn open_entry_gate(&self) -> bool;
    async fn close_entry_gate(&self) -> bool;
    async fn open_exit_gate(&self) -> bool;
    async fn close_exit_gate(&self) -> bool;
    async fn set_entry_light(&self, light: LightState) -> bool;
    async fn set_exit_light(&self, light: LightState) -> bool;
    /// Per-stall guide lights, one flag per spot (0-based)
    async fn set_spot_lights(&self, lights: Vec<bool>) -> bool;
    /// Occupancy from the current snapshot, 0-based
    fn occupied_state(&self) -> Vec<Option<u8>>;
    fn capacity(&self) -> usize;
}

/// Manages command flow to the garage and the polled state snapshot
pub struct GarageManager {
    connection: Arc<GarageConnection>,
    snapshot: RwLock<GarageState>,
    capacity: usize,
    timings: GarageTimings,
}

impl GarageManager {
    pub fn new(connection: Arc<GarageConnection>, capacity: usize) -> Self {
        Self::with_timings(connection, capacity, GarageTimings::default())
    }

    pub fn with_timings(
        connection: Arc<GarageConnection>,
        capacity: usize,
        timings: GarageTimings,
    ) -> Self {
        Self { connection, snapshot: RwLock::new(GarageState::default()), capacity, timings }
    }

    pub fn timings(&self) -> &GarageTimings {
        &self.timings
    }

    /// The stall ids this garage manages
    pub fn parking_spots(&self) -> Vec<i32> {
        (0..self.capacity as i32).collect()
    }

    /// Current snapshot (clone; the poll loop may replace the original at any
    /// time)
    pub fn snapshot(&self) -> GarageState {
        self.snapshot.read().clone()
    }

    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Send one command and require the literal `OK` acknowledgement.
    /// A missing or different reply is failure, same as a socket error.
    async fn send_command(&self, cmd: Command) -> bool {
        let encoded = cmd.encode();
        let response = self.connection.send(&encoded).await;
        let ok = response.as_deref() == Some(protocol::OK);
        if ok {
            debug!(command = %encoded, "garage_command_ok");
        } else {
            warn!(command = %encoded, response = ?response, "garage_command_failed");
        }
        ok
    }

    /// One poll tick: request state, decode, replace the snapshot wholesale.
    /// A malformed reply is ignored and the previous snapshot stays current.
    pub async fn update_state(&self) {
        let Some(reply) = self.connection.send(&Command::GetState.encode()).await else {
            return;
        };
        match protocol::decode_state_update(&reply) {
            Some(state) => {
                *self.snapshot.write() = state;
            }
            None => {
                debug!(reply = %reply, "poll_decode_ignored");
            }
        }
    }

    /// Run the state poll loop. Stops for good when the connection drops -
    /// reconnection is an operator action, not a retry loop.
    pub async fn run_poll_loop(
        self: Arc<Self>,
        event_tx: mpsc::Sender<GarageEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            poll_period_ms = %self.timings.poll_period.as_millis(),
            capacity = %self.capacity,
            "garage_poll_started"
        );

        let mut poll_timer = interval(self.timings.poll_period);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("garage_poll_shutdown");
                        return;
                    }
                }
                _ = poll_timer.tick() => {}
            }

            if !self.connection.is_connected().await {
                info!("garage_poll_stopped_disconnected");
                return;
            }

            self.update_state().await;

            let snapshot = self.snapshot();
            if snapshot.vehicle_at_entry() {
                self.emit(&event_tx, GarageEvent::VehicleAtEntry);
            }
            if snapshot.vehicle_at_exit() {
                self.emit(&event_tx, GarageEvent::VehicleAtExit);
            }
        }
    }

    /// Non-blocking emit so a slow consumer can never stall the poll tick
    fn emit(&self, event_tx: &mpsc::Sender<GarageEvent>, event: GarageEvent) {
        info!(event = %event.as_str(), "garage_event");
        if let Err(e) = event_tx.try_send(event) {
            warn!(event = %event.as_str(), error = %e, "garage_event_dropped");
        }
    }
}

#[async_trait]
impl GarageControl for GarageManager {
    async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    async fn open_entry_gate(&self) -> bool {
        self.send_command(Command::SetEntryGate(true)).await
    }

    async fn close_entry_gate(&self) -> bool {
        self.send_command(Command::SetEntryGate(false)).await
    }

    async fn open_exit_gate(&self) -> bool {
        self.send_command(Command::SetExitGate(true)).await
    }

    async fn close_exit_gate(&self) -> bool {
        self.send_command(Command::SetExitGate(false)).await
    }

    async fn set_entry_light(&self, light: LightState) -> bool {
        self.send_command(Command::SetEntryLight(light)).await
    }

    async fn set_exit_light(&self, light: LightState) -> bool {
        self.send_command(Command::SetExitLight(light)).await
    }

    async fn set_spot_lights(&self, lights: Vec<bool>) -> bool {
        self.send_command(Command::SetSpotLights(lights)).await
    }

    fn occupied_state(&self) -> Vec<Option<u8>> {
        self.snapshot.read().occupied.clone()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
