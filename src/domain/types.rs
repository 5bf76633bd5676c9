//! Shared types for garage state and events

use crate::domain::reservation::Reservation;
use serde::{Deserialize, Serialize};

/// Spot id meaning "no spot assigned yet"
pub const UNASSIGNED_SPOT: i32 = -1;

/// Spot id meaning "no spot available for the requested window"
pub const SPOT_UNAVAILABLE: i32 = -2;

/// Scratch size of the decoded per-spot arrays. The hardware never reports
/// more than this many stalls; the configured capacity (4) selects the
/// populated prefix.
pub const MAX_SPOTS: usize = 10;

/// Entry/exit signal light state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Green,
    Off,
}

impl LightState {
    /// Wire token for this light state (`R`/`G`/`0`)
    pub fn as_wire(&self) -> &'static str {
        match self {
            LightState::Red => "R",
            LightState::Green => "G",
            LightState::Off => "0",
        }
    }

    /// Parse a wire token. Any token other than `R`/`G`/`0` is not a light
    /// state and yields None (the field stays unset, not defaulted).
    pub fn from_wire(token: &str) -> Option<Self> {
        match token {
            "R" => Some(LightState::Red),
            "G" => Some(LightState::Green),
            "0" => Some(LightState::Off),
            _ => None,
        }
    }
}

/// Decoded snapshot of the garage hardware.
///
/// Built fresh from each `SU:` line and swapped in wholesale - fields absent
/// from an update are None, never carried over from the previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct GarageState {
    pub entry_gate: Option<bool>,
    pub exit_gate: Option<bool>,
    /// Entry beam broken = vehicle present at the entry gate
    pub entry_beam: Option<bool>,
    /// Exit beam broken = vehicle present at the exit gate
    pub exit_beam: Option<bool>,
    pub entry_light: Option<LightState>,
    pub exit_light: Option<LightState>,
    /// Per-stall guide lights, 1-based wire indices kept as-is (slot 0 unused)
    pub spot_lights: Vec<Option<u8>>,
    /// Per-stall occupancy, rebased to 0-based indices
    pub occupied: Vec<Option<u8>>,
}

impl Default for GarageState {
    fn default() -> Self {
        Self {
            entry_gate: None,
            exit_gate: None,
            entry_beam: None,
            exit_beam: None,
            entry_light: None,
            exit_light: None,
            spot_lights: vec![None; MAX_SPOTS],
            occupied: vec![None; MAX_SPOTS],
        }
    }
}

impl GarageState {
    /// Level-triggered: true every snapshot in which the entry beam reads broken
    pub fn vehicle_at_entry(&self) -> bool {
        self.entry_beam == Some(true)
    }

    pub fn vehicle_at_exit(&self) -> bool {
        self.exit_beam == Some(true)
    }

    /// Whether the given 0-based spot reads occupied in this snapshot
    pub fn spot_occupied(&self, spot: usize) -> bool {
        matches!(self.occupied.get(spot), Some(Some(1)))
    }
}

/// Sensor events raised by the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GarageEvent {
    VehicleAtEntry,
    VehicleAtExit,
}

impl GarageEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GarageEvent::VehicleAtEntry => "vehicle_at_entry",
            GarageEvent::VehicleAtExit => "vehicle_at_exit",
        }
    }
}

/// Outcomes delivered to the kiosk UI collaborator.
///
/// The kiosk itself is out of scope; this channel is its interface.
#[derive(Debug, Clone)]
pub enum KioskEvent {
    /// A vehicle is waiting at the entry gate; enables redemption
    VehicleAtEntry { occupied: Vec<Option<u8>> },
    /// A vehicle is waiting at the exit gate; prompts for a vehicle id
    VehicleAtExit { occupied: Vec<Option<u8>> },
    /// A new reservation was allocated a spot
    NewReservation(Reservation),
    /// An existing reservation was re-allocated
    ReservationUpdated(Reservation),
    /// Reservations redeemable right now for the queried customer/vehicle
    Redeemable(Vec<Reservation>),
    /// The entry sequence finished (gate closed behind the vehicle)
    EntryComplete(Reservation),
    /// The vehicle parked in a different stall than assigned
    WrongSpot { reservation: Reservation, expected: i32, actual: i32 },
    /// The exit sequence finished; the reservation carries its payment
    ExitComplete(Reservation),
    /// Result of the payment-validation stub
    PaymentValidated { payment: crate::domain::reservation::Payment, valid: bool },
    /// A user-visible error with a reason string
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_state_wire_round_trip() {
        for light in [LightState::Red, LightState::Green, LightState::Off] {
            assert_eq!(LightState::from_wire(light.as_wire()), Some(light));
        }
        assert_eq!(LightState::from_wire("X"), None);
        assert_eq!(LightState::from_wire(""), None);
    }

    #[test]
    fn test_fresh_snapshot_has_no_fields_set() {
        let state = GarageState::default();
        assert!(!state.vehicle_at_entry());
        assert!(!state.vehicle_at_exit());
        assert!(!state.spot_occupied(0));
        assert_eq!(state.occupied.len(), MAX_SPOTS);
    }
}
