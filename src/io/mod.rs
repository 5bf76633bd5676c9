//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `protocol` - pure codec for the garage wire format
//! - `connection` - TCP connection to the garage hardware
//! - `egress` - exit receipts to file (JSONL format)

pub mod connection;
pub mod egress;
pub mod protocol;

// Re-export commonly used types
pub use connection::{GarageConnection, GARAGE_PORT};
pub use egress::{ExitReceipt, ReceiptEgress};
pub use protocol::Command;
