//! Domain models - core business types for the garage
//!
//! This module contains the canonical data types used throughout the system:
//! - `Reservation` - a booking for a parking spot, with payment state
//! - `Payment` - card details (obfuscated at rest) and the computed fee
//! - `GarageState` - decoded hardware snapshot, replaced wholesale each poll
//! - `GarageEvent` - sensor events raised by the poll loop
//! - `KioskEvent` - outcomes delivered to the kiosk UI collaborator

pub mod reservation;
pub mod types;

// Re-export commonly used types at module level
pub use reservation::{Payment, Reservation};
pub use types::{GarageEvent, GarageState, KioskEvent, LightState};
