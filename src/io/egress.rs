//! Receipt egress - appends exit receipts to file
//!
//! Receipts are written in JSONL format (one JSON object per line). This is
//! the persistence collaborator's interface; a downstream admin tool tails
//! the file.

use crate::domain::reservation::Reservation;
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};
use uuid::Uuid;

/// One completed parking transaction
#[derive(Debug, Serialize)]
pub struct ExitReceipt {
    pub receipt_id: String,
    pub customer_name: String,
    pub vehicle_id: String,
    pub spot_id: i32,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub fee: i64,
    pub issued_at: NaiveDateTime,
}

impl ExitReceipt {
    /// Build a receipt from a reservation that has completed payment.
    /// None if the fee was never computed.
    pub fn from_reservation(rsvp: &Reservation) -> Option<Self> {
        let fee = rsvp.payment.as_ref()?.fee?;
        Some(Self {
            receipt_id: Uuid::now_v7().to_string(),
            customer_name: rsvp.customer_name.clone(),
            vehicle_id: rsvp.vehicle_id.clone(),
            spot_id: rsvp.spot_id,
            start_time: rsvp.start_time,
            end_time: rsvp.end_time,
            fee,
            issued_at: Utc::now().naive_utc(),
        })
    }
}

/// Egress writer for receipts
pub struct ReceiptEgress {
    file_path: String,
}

impl ReceiptEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "receipt_egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a receipt to the egress file.
    /// Returns true if successful, false otherwise.
    pub fn write_receipt(&self, receipt: &ExitReceipt) -> bool {
        let json = match serde_json::to_string(receipt) {
            Ok(json) => json,
            Err(e) => {
                error!(receipt_id = %receipt.receipt_id, error = %e, "receipt_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    receipt_id = %receipt.receipt_id,
                    vehicle_id = %receipt.vehicle_id,
                    fee = %receipt.fee,
                    "receipt_egressed"
                );
                true
            }
            Err(e) => {
                error!(receipt_id = %receipt.receipt_id, error = %e, "receipt_egress_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "receipt_written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reservation::Payment;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn paid_reservation() -> Reservation {
        let start = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap().and_hms_opt(11, 0, 0).unwrap();
        let mut rsvp = Reservation::new("Grace", "ABC-123", start, end);
        rsvp.spot_id = 1;
        rsvp.payment = Some(Payment::with_fee(30));
        rsvp
    }

    #[test]
    fn test_receipt_requires_computed_fee() {
        let mut rsvp = paid_reservation();
        rsvp.payment = Some(Payment::new());
        assert!(ExitReceipt::from_reservation(&rsvp).is_none());
        rsvp.payment = None;
        assert!(ExitReceipt::from_reservation(&rsvp).is_none());
    }

    #[test]
    fn test_write_receipt_appends_jsonl() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("receipts.jsonl");
        let egress = ReceiptEgress::new(file_path.to_str().unwrap());

        let receipt = ExitReceipt::from_reservation(&paid_reservation()).unwrap();
        assert!(egress.write_receipt(&receipt));
        assert!(egress.write_receipt(&receipt));

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["vehicle_id"], "ABC-123");
        assert_eq!(parsed["fee"], 30);
    }
}
