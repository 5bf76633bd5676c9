//! Reservations and payments
//!
//! A `Reservation` is identified by the (customer, vehicle, start, end)
//! tuple - equality covers exactly those four fields, so duplicate detection
//! works across distinct instances. Card details on a `Payment` are kept
//! obfuscated at rest via a reversible XOR transform (behavioral parity with
//! the deployed system, not real security).

use crate::domain::types::UNASSIGNED_SPOT;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Datelike, Month, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A booking for a parking spot over a half-open time window [start, end)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub customer_name: String,
    /// Vehicle identifier (license plate)
    pub vehicle_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Assigned stall, or the unassigned/unavailable sentinel
    pub spot_id: i32,
    pub is_paid: bool,
    pub is_redeemed: bool,
    pub payment: Option<Payment>,
}

impl Reservation {
    pub fn new(
        customer_name: &str,
        vehicle_id: &str,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Self {
        Self {
            customer_name: customer_name.to_string(),
            vehicle_id: vehicle_id.to_string(),
            start_time,
            end_time,
            spot_id: UNASSIGNED_SPOT,
            is_paid: false,
            is_redeemed: false,
            payment: None,
        }
    }

    /// A reservation is complete once customer and vehicle are filled in and
    /// a real spot has been assigned.
    pub fn is_complete(&self) -> bool {
        !self.customer_name.trim().is_empty()
            && !self.vehicle_id.trim().is_empty()
            && self.spot_id != UNASSIGNED_SPOT
    }

    /// Reserved duration in whole milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// Identity is the (customer, vehicle, start, end) tuple; spot assignment and
/// payment state do not distinguish reservations.
impl PartialEq for Reservation {
    fn eq(&self, other: &Self) -> bool {
        self.customer_name == other.customer_name
            && self.vehicle_id == other.vehicle_id
            && self.start_time == other.start_time
            && self.end_time == other.end_time
    }
}

impl Eq for Reservation {}

/// Key for the at-rest card-field transform
const OBFUSCATION_KEY: &[u8] = b"GARAGE";

/// XOR against the fixed key, base64-encoded for printability
fn obfuscate(plain: &str) -> String {
    let mixed: Vec<u8> = plain
        .bytes()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    STANDARD.encode(mixed)
}

/// Reverse of `obfuscate`. None if the stored value is not valid base64/UTF-8.
fn reveal(stored: &str) -> Option<String> {
    let mixed = STANDARD.decode(stored).ok()?;
    let plain: Vec<u8> = mixed
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    String::from_utf8(plain).ok()
}

/// Card details and the computed fee for one reservation.
///
/// Card fields are stored obfuscated; the accessors reveal them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    card_number: Option<String>,
    /// Expiry as `<MonthName>-<year>`, e.g. `January-2027`
    card_expiry: Option<String>,
    card_holder: Option<String>,
    /// Integer currency units; None until computed at exit
    pub fee: Option<i64>,
}

impl Payment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fee(fee: i64) -> Self {
        Self { fee: Some(fee), ..Self::default() }
    }

    pub fn set_card_number(&mut self, number: &str) {
        self.card_number = Some(obfuscate(number));
    }

    pub fn card_number(&self) -> Option<String> {
        self.card_number.as_deref().and_then(reveal)
    }

    pub fn set_card_expiry(&mut self, expiry: &str) {
        self.card_expiry = Some(obfuscate(expiry));
    }

    pub fn card_expiry(&self) -> Option<String> {
        self.card_expiry.as_deref().and_then(reveal)
    }

    pub fn set_card_holder(&mut self, holder: &str) {
        self.card_holder = Some(obfuscate(holder));
    }

    pub fn card_holder(&self) -> Option<String> {
        self.card_holder.as_deref().and_then(reveal)
    }

    /// Validation stub: all card fields present and the expiry month/year not
    /// in the past. Not a real payment gateway.
    pub fn is_valid_at(&self, today: NaiveDate) -> bool {
        let (Some(number), Some(expiry), Some(holder)) =
            (self.card_number(), self.card_expiry(), self.card_holder())
        else {
            return false;
        };
        if number.trim().is_empty() || expiry.trim().is_empty() || holder.trim().is_empty() {
            return false;
        }

        let Some((month_str, year_str)) = expiry.split_once('-') else {
            return false;
        };
        let Ok(card_year) = year_str.trim().parse::<i32>() else {
            return false;
        };
        // An unparseable month counts as month 0, which only passes when the
        // year is strictly in the future.
        let card_month = month_str
            .trim()
            .parse::<Month>()
            .map(|m| m.number_from_month())
            .unwrap_or(0);

        card_year > today.year() || (card_year == today.year() && card_month >= today.month())
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    fn sample() -> Reservation {
        Reservation::new("Grace", "ABC-123", dt(2026, 9, 1, 10, 0), dt(2026, 9, 1, 12, 0))
    }

    #[test]
    fn test_duplicate_identity_matches_across_instances() {
        let a = sample();
        let mut b = sample();
        b.spot_id = 3;
        b.is_paid = true;
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_differing_identity_field_is_distinct() {
        let base = sample();

        let mut other = sample();
        other.customer_name = "Hopper".to_string();
        assert_ne!(base, other);

        let mut other = sample();
        other.vehicle_id = "XYZ-999".to_string();
        assert_ne!(base, other);

        let mut other = sample();
        other.start_time = dt(2026, 9, 1, 11, 0);
        assert_ne!(base, other);

        let mut other = sample();
        other.end_time = dt(2026, 9, 1, 13, 0);
        assert_ne!(base, other);
    }

    #[test]
    fn test_completeness_requires_assigned_spot() {
        let mut rsvp = sample();
        assert!(!rsvp.is_complete());
        rsvp.spot_id = 0;
        assert!(rsvp.is_complete());
    }

    #[test]
    fn test_completeness_requires_nonblank_fields() {
        let mut rsvp = sample();
        rsvp.spot_id = 1;
        rsvp.vehicle_id = "   ".to_string();
        assert!(!rsvp.is_complete());
    }

    #[test]
    fn test_obfuscation_round_trip() {
        let mut payment = Payment::new();
        payment.set_card_number("4111111111111111");
        payment.set_card_holder("Grace Hopper");
        // Stored form differs from the plaintext
        assert_ne!(payment.card_number.as_deref(), Some("4111111111111111"));
        assert_eq!(payment.card_number().as_deref(), Some("4111111111111111"));
        assert_eq!(payment.card_holder().as_deref(), Some("Grace Hopper"));
    }

    #[test]
    fn test_payment_valid_with_future_expiry() {
        let mut payment = Payment::new();
        payment.set_card_number("4111111111111111");
        payment.set_card_expiry("January-2030");
        payment.set_card_holder("Grace Hopper");
        assert!(payment.is_valid_at(NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()));
    }

    #[test]
    fn test_payment_invalid_when_expired() {
        let mut payment = Payment::new();
        payment.set_card_number("4111111111111111");
        payment.set_card_expiry("July-2026");
        payment.set_card_holder("Grace Hopper");
        assert!(!payment.is_valid_at(NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()));
    }

    #[test]
    fn test_payment_valid_in_expiry_month() {
        let mut payment = Payment::new();
        payment.set_card_number("4111111111111111");
        payment.set_card_expiry("August-2026");
        payment.set_card_holder("Grace Hopper");
        assert!(payment.is_valid_at(NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()));
    }

    #[test]
    fn test_payment_invalid_when_fields_missing() {
        let mut payment = Payment::new();
        payment.set_card_number("4111111111111111");
        assert!(!payment.is_valid_at(NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()));
    }
}
