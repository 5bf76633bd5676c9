//! Service modules - the long-running tasks of the controller
//!
//! - `garage` - typed hardware commands, state snapshot, poll loop
//! - `orchestrator` - entry/exit sequencing and live occupancy
//! - `allocator` - reservation store, spot assignment, redemption
//! - `fees` - fee calculation and payment settlement

pub mod allocator;
pub mod fees;
pub mod garage;
pub mod orchestrator;

pub use allocator::{AllocatorCommand, ReservationAllocator};
pub use fees::{FeeCalculator, PaymentCommand};
pub use garage::{GarageControl, GarageManager, GarageTimings};
pub use orchestrator::{ParkingCommand, ParkingOrchestrator};
