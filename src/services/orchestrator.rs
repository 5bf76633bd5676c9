//! Parking orchestrator - entry and exit sequences
//!
//! Owns the live occupancy list and drives the physical gate/light sequences.
//! Commands arrive on a typed channel from the kiosk, allocator and payment
//! services; sensor events arrive from the poll loop and are forwarded to the
//! kiosk with the current occupancy attached.
//!
//! A hardware command that fails aborts the remaining steps of its sequence.
//! There are no retries and no rollback of already-issued commands; the
//! garage is left in whatever state it reached and the failure is logged.

use crate::domain::reservation::Reservation;
use crate::domain::types::{GarageEvent, KioskEvent, LightState, UNASSIGNED_SPOT};
use crate::io::egress::{ExitReceipt, ReceiptEgress};
use crate::services::allocator::AllocatorCommand;
use crate::services::fees::PaymentCommand;
use crate::services::garage::{GarageControl, GarageTimings};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{info, warn};

/// Requests handled by the orchestrator
#[derive(Debug)]
pub enum ParkingCommand {
    /// Redeemed reservation at the entry gate - run the entry sequence
    EnterGarage(Reservation),
    /// Vehicle at the exit gate identified itself - start fee settlement
    ExitRequest(String),
    /// Payment settled - run the exit sequence
    PaymentComplete(Reservation),
}

pub struct ParkingOrchestrator {
    garage: Arc<dyn GarageControl>,
    /// Reservations whose vehicles are currently inside
    occupancy: Mutex<Vec<Reservation>>,
    kiosk_tx: mpsc::Sender<KioskEvent>,
    allocator_tx: mpsc::Sender<AllocatorCommand>,
    payment_tx: mpsc::Sender<PaymentCommand>,
    egress: Option<ReceiptEgress>,
    timings: GarageTimings,
}

impl ParkingOrchestrator {
    pub fn new(
        garage: Arc<dyn GarageControl>,
        kiosk_tx: mpsc::Sender<KioskEvent>,
        allocator_tx: mpsc::Sender<AllocatorCommand>,
        payment_tx: mpsc::Sender<PaymentCommand>,
        egress: Option<ReceiptEgress>,
        timings: GarageTimings,
    ) -> Self {
        Self {
            garage,
            occupancy: Mutex::new(Vec::new()),
            kiosk_tx,
            allocator_tx,
            payment_tx,
            egress,
            timings,
        }
    }

    /// Reservations currently inside (clone of the live list)
    pub fn occupancy(&self) -> Vec<Reservation> {
        self.occupancy.lock().clone()
    }

    /// Drive the hardware to its known starting state: both lights red, both
    /// gates closed, all spot lights off.
    pub async fn initialize(&self) -> bool {
        let ok = self.garage.set_entry_light(LightState::Red).await
            && self.garage.set_exit_light(LightState::Red).await
            && self.garage.close_entry_gate().await
            && self.garage.close_exit_gate().await
            && self.garage.set_spot_lights(vec![false; self.garage.capacity()]).await;
        if ok {
            info!("garage_initialized");
        } else {
            warn!("garage_initialize_failed");
        }
        ok
    }

    /// Main loop: parking commands and sensor events, until shutdown
    pub async fn run(
        self: Arc<Self>,
        mut cmd_rx: mpsc::Receiver<ParkingCommand>,
        mut event_rx: mpsc::Receiver<GarageEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("orchestrator_started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("orchestrator_shutdown");
                        return;
                    }
                }
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { return };
                    match cmd {
                        ParkingCommand::EnterGarage(rsvp) => self.handle_entry(rsvp).await,
                        ParkingCommand::ExitRequest(vid) => self.handle_exit_request(&vid).await,
                        ParkingCommand::PaymentComplete(rsvp) => {
                            self.handle_payment_complete(rsvp).await
                        }
                    }
                }
                event = event_rx.recv() => {
                    let Some(event) = event else { return };
                    self.forward_event(event).await;
                }
            }
        }
    }

    /// Sensor events go to the kiosk with the hardware occupancy attached
    async fn forward_event(&self, event: GarageEvent) {
        let occupied = self.garage.occupied_state();
        let kiosk_event = match event {
            GarageEvent::VehicleAtEntry => KioskEvent::VehicleAtEntry { occupied },
            GarageEvent::VehicleAtExit => KioskEvent::VehicleAtExit { occupied },
        };
        let _ = self.kiosk_tx.send(kiosk_event).await;
    }

    /// Entry sequence for a redeemed reservation.
    ///
    /// If the assigned spot already reads occupied, no hardware command is
    /// issued at all: the assignment is invalidated and sent back to the
    /// allocator, and the sequence ends before the gate moves.
    async fn handle_entry(&self, mut rsvp: Reservation) {
        let spot = rsvp.spot_id;
        if spot < 0 || spot as usize >= self.garage.capacity() {
            warn!(spot_id = %spot, "entry_rejected_bad_spot");
            return;
        }

        let pre_park = self.garage.occupied_state();
        if pre_park.get(spot as usize).copied().flatten() == Some(1) {
            warn!(
                vehicle_id = %rsvp.vehicle_id,
                spot_id = %spot,
                "assigned_spot_occupied"
            );
            rsvp.spot_id = UNASSIGNED_SPOT;
            let _ = self.allocator_tx.send(AllocatorCommand::Update(rsvp)).await;
            return;
        }

        info!(vehicle_id = %rsvp.vehicle_id, spot_id = %spot, "entry_started");

        if !self.garage.set_entry_light(LightState::Green).await {
            return self.abort_sequence("entry");
        }
        if !self.garage.open_entry_gate().await {
            return self.abort_sequence("entry");
        }
        let mut guide = vec![false; self.garage.capacity()];
        guide[spot as usize] = true;
        if !self.garage.set_spot_lights(guide).await {
            return self.abort_sequence("entry");
        }

        sleep(self.timings.grace_window).await;

        if !self.garage.set_entry_light(LightState::Red).await {
            return self.abort_sequence("entry");
        }
        if !self.garage.close_entry_gate().await {
            return self.abort_sequence("entry");
        }

        let _ = self.kiosk_tx.send(KioskEvent::EntryComplete(rsvp.clone())).await;

        // Watch the assigned spot for a bounded number of re-reads
        let mut parked_ok = false;
        let mut post_park = pre_park.clone();
        for _ in 0..self.timings.spot_poll_attempts {
            sleep(self.timings.spot_poll_tick).await;
            post_park = self.garage.occupied_state();
            if post_park.get(spot as usize).copied().flatten() == Some(1) {
                parked_ok = true;
                break;
            }
        }

        if !parked_ok {
            // First spot whose reading changed is where the vehicle went
            let actual = pre_park
                .iter()
                .zip(post_park.iter())
                .position(|(before, after)| before != after)
                .map(|idx| idx as i32)
                .unwrap_or(UNASSIGNED_SPOT);
            warn!(
                vehicle_id = %rsvp.vehicle_id,
                expected = %spot,
                actual = %actual,
                "vehicle_parked_in_wrong_spot"
            );
            let _ = self
                .kiosk_tx
                .send(KioskEvent::WrongSpot { reservation: rsvp.clone(), expected: spot, actual })
                .await;
        }

        // Guide lights go out whether or not the park was correct
        let _ = self.garage.set_spot_lights(vec![false; self.garage.capacity()]).await;

        if parked_ok {
            info!(vehicle_id = %rsvp.vehicle_id, spot_id = %spot, "vehicle_parked");
            let _ = self.allocator_tx.send(AllocatorCommand::Complete(rsvp.clone())).await;
            self.occupancy.lock().push(rsvp);
        }
    }

    /// A vehicle at the exit identified itself. Unknown vehicles are logged
    /// and ignored; known ones go to the payment service for settlement.
    async fn handle_exit_request(&self, vehicle_id: &str) {
        let rsvp = {
            let occupancy = self.occupancy.lock();
            occupancy.iter().find(|r| r.vehicle_id == vehicle_id).cloned()
        };
        match rsvp {
            Some(rsvp) => {
                info!(vehicle_id = %vehicle_id, "exit_requested");
                let _ = self.payment_tx.send(PaymentCommand::MakePayment(rsvp)).await;
            }
            None => {
                warn!(vehicle_id = %vehicle_id, "exit_request_unknown_vehicle");
            }
        }
    }

    /// Exit sequence once payment is settled. A reservation without a
    /// computed fee never opens the gate.
    async fn handle_payment_complete(&self, rsvp: Reservation) {
        let Some(fee) = rsvp.payment.as_ref().and_then(|p| p.fee) else {
            warn!(vehicle_id = %rsvp.vehicle_id, "payment_complete_without_fee");
            return;
        };

        info!(vehicle_id = %rsvp.vehicle_id, fee = %fee, "exit_started");

        if !self.garage.set_exit_light(LightState::Green).await {
            return self.abort_sequence("exit");
        }
        if !self.garage.open_exit_gate().await {
            return self.abort_sequence("exit");
        }

        sleep(self.timings.grace_window).await;

        if !self.garage.set_exit_light(LightState::Red).await {
            return self.abort_sequence("exit");
        }
        if !self.garage.close_exit_gate().await {
            return self.abort_sequence("exit");
        }

        {
            let mut occupancy = self.occupancy.lock();
            if let Some(idx) = occupancy.iter().position(|r| r.vehicle_id == rsvp.vehicle_id) {
                occupancy.remove(idx);
            }
        }

        if let Some(egress) = &self.egress {
            if let Some(receipt) = ExitReceipt::from_reservation(&rsvp) {
                egress.write_receipt(&receipt);
            }
        }

        info!(vehicle_id = %rsvp.vehicle_id, "exit_complete");
        let _ = self.kiosk_tx.send(KioskEvent::ExitComplete(rsvp)).await;
    }

    fn abort_sequence(&self, sequence: &str) {
        warn!(sequence = %sequence, "sequence_aborted_command_failed");
    }
}
