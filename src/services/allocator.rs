//! Reservation allocation - spot assignment, validation, redemption
//!
//! Holds the in-memory reservation store (flat-file persistence is an
//! external collaborator) and answers allocation requests from the kiosk and
//! the orchestrator.
//!
//! Spot assignment packs into `max(overlapping spot ids) + 1` rather than
//! scanning for the lowest free slot. That matches the deployed allocator,
//! including its ability to skip free low-numbered spots; the corrected scan
//! is available via `with_first_free_scan` and is off in the shipped wiring.

use crate::domain::reservation::Reservation;
use crate::domain::types::{KioskEvent, SPOT_UNAVAILABLE, UNASSIGNED_SPOT};
use chrono::{NaiveDateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Longest allowed reservation, whole hours
const MAX_RESERVATION_HOURS: i64 = 24;

/// Reservations may start/end at most this far out (7 days)
const MAX_ADVANCE_MS: i64 = 604_800_000;

const MILLIS_PER_HOUR: i64 = 1000 * 60 * 60;

/// In-memory reservation set. Persistence lives outside this crate; the
/// store only guarantees the invariants the allocator needs.
#[derive(Default)]
pub struct ReservationStore {
    reservations: Vec<Reservation>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn add(&mut self, rsvp: Reservation) {
        self.reservations.push(rsvp);
    }

    /// True if an identical (customer, vehicle, start, end) tuple exists
    pub fn is_duplicate(&self, rsvp: &Reservation) -> bool {
        self.reservations.iter().any(|r| r == rsvp)
    }

    pub fn lookup_by_customer(&self, name: &str) -> Vec<Reservation> {
        self.reservations.iter().filter(|r| r.customer_name == name).cloned().collect()
    }

    pub fn lookup_by_vehicle(&self, vehicle_id: &str) -> Vec<Reservation> {
        self.reservations.iter().filter(|r| r.vehicle_id == vehicle_id).cloned().collect()
    }

    /// Mark the matching stored reservation redeemed
    pub fn mark_redeemed(&mut self, rsvp: &Reservation) {
        if let Some(stored) = self.reservations.iter_mut().find(|r| *r == rsvp) {
            stored.is_redeemed = true;
        }
    }
}

/// Requests handled by the allocator service
#[derive(Debug)]
pub enum AllocatorCommand {
    /// Allocate a spot for a new reservation
    Create(Reservation),
    /// Re-allocate an existing reservation (e.g. assigned spot found taken)
    Update(Reservation),
    /// Find reservations redeemable right now, by customer or vehicle
    Redeem { customer: Option<String>, vehicle: Option<String> },
    /// Reservation paid for - store it
    Confirm(Reservation),
    /// Reservation redeemed at physical entry
    Complete(Reservation),
}

pub struct ReservationAllocator {
    store: ReservationStore,
    capacity: usize,
    first_free_scan: bool,
}

impl ReservationAllocator {
    pub fn new(capacity: usize) -> Self {
        Self { store: ReservationStore::new(), capacity, first_free_scan: false }
    }

    /// Use a true lowest-free-slot scan instead of the packing assignment.
    /// Off by default for compatibility with the deployed behavior.
    pub fn with_first_free_scan(mut self, enabled: bool) -> Self {
        self.first_free_scan = enabled;
        self
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    /// Half-open interval overlap: touching boundaries do not conflict
    pub fn windows_overlap(
        st1: NaiveDateTime,
        et1: NaiveDateTime,
        st2: NaiveDateTime,
        et2: NaiveDateTime,
    ) -> bool {
        st1 < et2 && et1 > st2
    }

    /// Pick a spot for the reservation's window. 0 when nothing overlaps,
    /// the unavailable sentinel when the window is full, otherwise the next
    /// numeric slot above the highest overlapping assignment.
    pub fn assign_spot(&self, rsvp: &Reservation) -> i32 {
        let mut occupied_spots: Vec<i32> = self
            .store
            .reservations
            .iter()
            .filter(|r| {
                Self::windows_overlap(r.start_time, r.end_time, rsvp.start_time, rsvp.end_time)
            })
            .map(|r| r.spot_id)
            .collect();

        if occupied_spots.is_empty() {
            return 0;
        }
        if occupied_spots.len() >= self.capacity {
            return SPOT_UNAVAILABLE;
        }

        if self.first_free_scan {
            return (0..self.capacity as i32)
                .find(|spot| !occupied_spots.contains(spot))
                .unwrap_or(SPOT_UNAVAILABLE);
        }

        occupied_spots.sort_unstable();
        occupied_spots[occupied_spots.len() - 1] + 1
    }

    /// Window and field checks applied before allocation
    pub fn verify(&self, rsvp: &Reservation, now: NaiveDateTime) -> bool {
        if rsvp.start_time >= rsvp.end_time {
            return false;
        }
        if rsvp.duration_ms() / MILLIS_PER_HOUR > MAX_RESERVATION_HOURS {
            return false;
        }
        if now > rsvp.start_time {
            return false;
        }
        if (rsvp.start_time - now).num_milliseconds() >= MAX_ADVANCE_MS {
            return false;
        }
        if (rsvp.end_time - now).num_milliseconds() >= MAX_ADVANCE_MS {
            return false;
        }
        if rsvp.customer_name.trim().is_empty() || rsvp.vehicle_id.trim().is_empty() {
            return false;
        }
        true
    }

    /// Allocate a spot for a new reservation. The reservation is not stored
    /// until it is confirmed (paid for).
    pub fn create(
        &self,
        mut rsvp: Reservation,
        now: NaiveDateTime,
    ) -> Result<Reservation, String> {
        if self.store.is_duplicate(&rsvp) {
            return Err("Reservation is a duplicate, please submit unique reservation".to_string());
        }
        if !self.verify(&rsvp, now) {
            return Err("Reservation is invalid, please submit a valid reservation".to_string());
        }

        let spot = self.assign_spot(&rsvp);
        if spot == UNASSIGNED_SPOT || spot == SPOT_UNAVAILABLE {
            return Err("Parking space unavailable at desired time".to_string());
        }
        rsvp.spot_id = spot;

        if rsvp.is_complete() {
            Ok(rsvp)
        } else {
            Err("Could not complete reservation".to_string())
        }
    }

    /// Re-allocate a spot for an existing reservation whose assignment fell
    /// through (e.g. occupied at entry).
    pub fn update(&self, mut rsvp: Reservation) -> Result<Reservation, String> {
        let spot = self.assign_spot(&rsvp);
        if spot == UNASSIGNED_SPOT || spot == SPOT_UNAVAILABLE {
            return Err("Please call attendant for assistance!".to_string());
        }
        rsvp.spot_id = spot;
        Ok(rsvp)
    }

    /// Reservations redeemable right now for the given customer (preferred)
    /// or vehicle: window contains `now` and not yet redeemed.
    pub fn redeemable(
        &self,
        customer: Option<&str>,
        vehicle: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Vec<Reservation>, String> {
        let results = if let Some(name) = customer {
            self.store.lookup_by_customer(name)
        } else if let Some(vid) = vehicle {
            self.store.lookup_by_vehicle(vid)
        } else {
            Vec::new()
        };

        if results.is_empty() {
            return Err("Cannot find reservation!".to_string());
        }

        let valid: Vec<Reservation> = results
            .into_iter()
            .filter(|r| now > r.start_time && now < r.end_time && !r.is_redeemed)
            .collect();

        if valid.is_empty() {
            return Err("No reservations valid at this time".to_string());
        }
        Ok(valid)
    }

    /// Spot reserved and paid for - store it
    pub fn confirm(&mut self, rsvp: Reservation) {
        info!(
            customer = %rsvp.customer_name,
            vehicle_id = %rsvp.vehicle_id,
            spot_id = %rsvp.spot_id,
            "reservation_confirmed"
        );
        self.store.add(rsvp);
    }

    /// Reservation redeemed at physical entry
    pub fn complete(&mut self, rsvp: &Reservation) {
        self.store.mark_redeemed(rsvp);
    }
}

/// Allocator service loop: answers commands, reports outcomes (including
/// validation failures, as tagged reason strings) on the kiosk channel.
pub async fn run_allocator(
    mut allocator: ReservationAllocator,
    mut cmd_rx: mpsc::Receiver<AllocatorCommand>,
    kiosk_tx: mpsc::Sender<KioskEvent>,
) {
    info!(capacity = %allocator.capacity, "allocator_started");

    while let Some(cmd) = cmd_rx.recv().await {
        let now = Utc::now().naive_utc();
        let event = match cmd {
            AllocatorCommand::Create(rsvp) => match allocator.create(rsvp, now) {
                Ok(rsvp) => KioskEvent::NewReservation(rsvp),
                Err(reason) => {
                    warn!(reason = %reason, "reservation_rejected");
                    KioskEvent::Error(reason)
                }
            },
            AllocatorCommand::Update(rsvp) => match allocator.update(rsvp) {
                Ok(rsvp) => KioskEvent::ReservationUpdated(rsvp),
                Err(reason) => {
                    warn!(reason = %reason, "reallocation_failed");
                    KioskEvent::Error(reason)
                }
            },
            AllocatorCommand::Redeem { customer, vehicle } => {
                match allocator.redeemable(customer.as_deref(), vehicle.as_deref(), now) {
                    Ok(found) => KioskEvent::Redeemable(found),
                    Err(reason) => KioskEvent::Error(reason),
                }
            }
            AllocatorCommand::Confirm(rsvp) => {
                allocator.confirm(rsvp);
                continue;
            }
            AllocatorCommand::Complete(rsvp) => {
                allocator.complete(&rsvp);
                continue;
            }
        };

        if kiosk_tx.send(event).await.is_err() {
            break;
        }
    }

    info!("allocator_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 9, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    fn rsvp(name: &str, vid: &str, start: NaiveDateTime, end: NaiveDateTime) -> Reservation {
        Reservation::new(name, vid, start, end)
    }

    fn now() -> NaiveDateTime {
        dt(1, 8, 0)
    }

    #[test]
    fn test_touching_windows_do_not_overlap() {
        assert!(!ReservationAllocator::windows_overlap(
            dt(1, 10, 0),
            dt(1, 11, 0),
            dt(1, 11, 0),
            dt(1, 12, 0)
        ));
    }

    #[test]
    fn test_partial_windows_overlap() {
        assert!(ReservationAllocator::windows_overlap(
            dt(1, 10, 0),
            dt(1, 11, 30),
            dt(1, 11, 0),
            dt(1, 12, 0)
        ));
    }

    #[test]
    fn test_first_reservation_gets_spot_zero() {
        let allocator = ReservationAllocator::new(4);
        let r = rsvp("Grace", "AAA-111", dt(1, 10, 0), dt(1, 12, 0));
        assert_eq!(allocator.assign_spot(&r), 0);
    }

    #[test]
    fn test_full_window_returns_unavailable_sentinel() {
        let mut allocator = ReservationAllocator::new(4);
        for i in 0..4 {
            let mut r = rsvp(&format!("C{}", i), &format!("V{}", i), dt(1, 10, 0), dt(1, 12, 0));
            r.spot_id = i;
            allocator.confirm(r);
        }
        let fifth = rsvp("Late", "V9", dt(1, 10, 30), dt(1, 11, 30));
        assert_eq!(allocator.assign_spot(&fifth), SPOT_UNAVAILABLE);
    }

    #[test]
    fn test_packing_assigns_above_highest_overlapping_spot() {
        let mut allocator = ReservationAllocator::new(4);
        let mut a = rsvp("A", "VA", dt(1, 10, 0), dt(1, 12, 0));
        a.spot_id = 0;
        allocator.confirm(a);
        let mut b = rsvp("B", "VB", dt(1, 10, 0), dt(1, 12, 0));
        b.spot_id = 2;
        allocator.confirm(b);

        // Spot 1 is free but the packing assignment skips it
        let c = rsvp("C", "VC", dt(1, 10, 0), dt(1, 12, 0));
        assert_eq!(allocator.assign_spot(&c), 3);
    }

    #[test]
    fn test_first_free_scan_fills_the_gap() {
        let mut allocator = ReservationAllocator::new(4).with_first_free_scan(true);
        let mut a = rsvp("A", "VA", dt(1, 10, 0), dt(1, 12, 0));
        a.spot_id = 0;
        allocator.confirm(a);
        let mut b = rsvp("B", "VB", dt(1, 10, 0), dt(1, 12, 0));
        b.spot_id = 2;
        allocator.confirm(b);

        let c = rsvp("C", "VC", dt(1, 10, 0), dt(1, 12, 0));
        assert_eq!(allocator.assign_spot(&c), 1);
    }

    #[test]
    fn test_non_overlapping_windows_share_spot_zero() {
        let mut allocator = ReservationAllocator::new(4);
        let mut a = rsvp("A", "VA", dt(1, 10, 0), dt(1, 11, 0));
        a.spot_id = 0;
        allocator.confirm(a);

        // Touches the boundary only - not a conflict
        let b = rsvp("B", "VB", dt(1, 11, 0), dt(1, 12, 0));
        assert_eq!(allocator.assign_spot(&b), 0);
    }

    #[test]
    fn test_create_rejects_duplicates_across_instances() {
        let mut allocator = ReservationAllocator::new(4);
        let mut stored = rsvp("Grace", "AAA-111", dt(1, 10, 0), dt(1, 12, 0));
        stored.spot_id = 0;
        allocator.confirm(stored);

        // A distinct instance with the same identity tuple
        let dup = rsvp("Grace", "AAA-111", dt(1, 10, 0), dt(1, 12, 0));
        let err = allocator.create(dup, now()).unwrap_err();
        assert!(err.contains("duplicate"));

        // One differing field and it goes through
        let other = rsvp("Grace", "BBB-222", dt(1, 10, 0), dt(1, 12, 0));
        assert!(allocator.create(other, now()).is_ok());
    }

    #[test]
    fn test_verify_rejects_inverted_window() {
        let allocator = ReservationAllocator::new(4);
        assert!(!allocator.verify(&rsvp("A", "V", dt(1, 12, 0), dt(1, 10, 0)), now()));
        assert!(!allocator.verify(&rsvp("A", "V", dt(1, 10, 0), dt(1, 10, 0)), now()));
    }

    #[test]
    fn test_verify_rejects_over_24_hours() {
        let allocator = ReservationAllocator::new(4);
        assert!(!allocator.verify(&rsvp("A", "V", dt(1, 10, 0), dt(2, 11, 0)), now()));
        // Exactly 24h is allowed
        assert!(allocator.verify(&rsvp("A", "V", dt(1, 10, 0), dt(2, 10, 0)), now()));
    }

    #[test]
    fn test_verify_rejects_start_in_the_past() {
        let allocator = ReservationAllocator::new(4);
        assert!(!allocator.verify(&rsvp("A", "V", dt(1, 7, 0), dt(1, 10, 0)), now()));
    }

    #[test]
    fn test_verify_rejects_window_beyond_a_week() {
        let allocator = ReservationAllocator::new(4);
        assert!(!allocator.verify(&rsvp("A", "V", dt(9, 8, 0), dt(9, 10, 0)), now()));
        // End past the week boundary also fails
        assert!(!allocator.verify(&rsvp("A", "V", dt(8, 6, 0), dt(8, 9, 0)), now()));
    }

    #[test]
    fn test_verify_rejects_blank_fields() {
        let allocator = ReservationAllocator::new(4);
        assert!(!allocator.verify(&rsvp("  ", "V", dt(1, 10, 0), dt(1, 12, 0)), now()));
        assert!(!allocator.verify(&rsvp("A", "", dt(1, 10, 0), dt(1, 12, 0)), now()));
    }

    #[test]
    fn test_redeemable_prefers_customer_and_checks_window() {
        let mut allocator = ReservationAllocator::new(4);
        let mut active = rsvp("Grace", "AAA-111", dt(1, 7, 0), dt(1, 12, 0));
        active.spot_id = 0;
        allocator.confirm(active);
        let mut future = rsvp("Grace", "AAA-111", dt(2, 7, 0), dt(2, 12, 0));
        future.spot_id = 1;
        allocator.confirm(future);

        let found = allocator.redeemable(Some("Grace"), None, now()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].spot_id, 0);

        let by_vehicle = allocator.redeemable(None, Some("AAA-111"), now()).unwrap();
        assert_eq!(by_vehicle.len(), 1);
    }

    #[test]
    fn test_redeemable_excludes_already_redeemed() {
        let mut allocator = ReservationAllocator::new(4);
        let mut active = rsvp("Grace", "AAA-111", dt(1, 7, 0), dt(1, 12, 0));
        active.spot_id = 0;
        active.is_redeemed = true;
        allocator.confirm(active);

        let err = allocator.redeemable(Some("Grace"), None, now()).unwrap_err();
        assert_eq!(err, "No reservations valid at this time");
    }

    #[test]
    fn test_redeemable_unknown_customer() {
        let allocator = ReservationAllocator::new(4);
        let err = allocator.redeemable(Some("Nobody"), None, now()).unwrap_err();
        assert_eq!(err, "Cannot find reservation!");
    }

    #[test]
    fn test_complete_marks_stored_reservation_redeemed() {
        let mut allocator = ReservationAllocator::new(4);
        let mut active = rsvp("Grace", "AAA-111", dt(1, 7, 0), dt(1, 12, 0));
        active.spot_id = 0;
        allocator.confirm(active.clone());

        allocator.complete(&active);
        assert!(allocator.store().reservations()[0].is_redeemed);
    }
}
