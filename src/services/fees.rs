//! Fee calculation and payment handling
//!
//! Fees are summed per started hour of the reserved window, rated by when
//! that hour slice begins (weekday/weekend, day/night). Staying past the
//! reserved window accrues whole penalty hours on top.

use crate::domain::reservation::{Payment, Reservation};
use crate::domain::types::KioskEvent;
use crate::services::orchestrator::ParkingCommand;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Hourly rates, whole currency units
const WEEKDAY_DAY_RATE: i64 = 15;
const WEEKDAY_NIGHT_RATE: i64 = 10;
const WEEKEND_DAY_RATE: i64 = 12;
const WEEKEND_NIGHT_RATE: i64 = 8;

/// Per-hour penalty for staying past the reserved end
const PENALTY_RATE: i64 = 20;

/// Stateless fee calculator
pub struct FeeCalculator;

impl FeeCalculator {
    /// Rate for the hour slice beginning at `at`. Daytime is 09:00 through
    /// 16:59 inclusive; Saturday and Sunday are weekend.
    pub fn slice_rate(at: NaiveDateTime) -> i64 {
        let weekend = at.weekday().number_from_monday() >= 6;
        let daytime = (9..17).contains(&at.hour());
        match (weekend, daytime) {
            (false, true) => WEEKDAY_DAY_RATE,
            (false, false) => WEEKDAY_NIGHT_RATE,
            (true, true) => WEEKEND_DAY_RATE,
            (true, false) => WEEKEND_NIGHT_RATE,
        }
    }

    /// Base fee for the reserved window: one slice per whole hour, each rated
    /// at `start + k` hours.
    pub fn reserved_fee(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
        let hours = (end - start).num_hours();
        (0..hours).map(|k| Self::slice_rate(start + Duration::hours(k))).sum()
    }

    /// Whole penalty hours accrued past the reserved window
    pub fn overage_hours(start: NaiveDateTime, end: NaiveDateTime, now: NaiveDateTime) -> i64 {
        let parked_hours = (now - start).num_hours();
        let reserved_hours = (end - start).num_hours();
        (parked_hours - reserved_hours).max(0)
    }

    /// Total fee owed at `now`: reserved-window fee plus penalty
    pub fn total_fee(rsvp: &Reservation, now: NaiveDateTime) -> i64 {
        Self::reserved_fee(rsvp.start_time, rsvp.end_time)
            + Self::overage_hours(rsvp.start_time, rsvp.end_time, now) * PENALTY_RATE
    }
}

/// Requests handled by the payment service
#[derive(Debug)]
pub enum PaymentCommand {
    /// Compute the fee and settle payment for an exiting vehicle
    MakePayment(Reservation),
    /// Check a payment's fields and expiry date
    ValidatePayment(Payment),
}

/// Payment service loop. Settled payments flow back to the orchestrator as
/// `PaymentComplete`; validation results go to the kiosk.
pub async fn run_payment_service(
    mut cmd_rx: mpsc::Receiver<PaymentCommand>,
    parking_tx: mpsc::Sender<ParkingCommand>,
    kiosk_tx: mpsc::Sender<KioskEvent>,
) {
    info!("payment_service_started");

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            PaymentCommand::MakePayment(mut rsvp) => {
                let now = Utc::now().naive_utc();
                let fee = FeeCalculator::total_fee(&rsvp, now);
                info!(vehicle_id = %rsvp.vehicle_id, fee = %fee, "payment_settled");

                let mut payment = rsvp.payment.take().unwrap_or_default();
                payment.fee = Some(fee);
                rsvp.payment = Some(payment);
                rsvp.is_paid = true;

                if parking_tx.send(ParkingCommand::PaymentComplete(rsvp)).await.is_err() {
                    warn!("payment_result_dropped");
                    break;
                }
            }
            PaymentCommand::ValidatePayment(payment) => {
                let today = Utc::now().naive_utc().date();
                let valid = payment.is_valid_at(today);
                if kiosk_tx.send(KioskEvent::PaymentValidated { payment, valid }).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("payment_service_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2026-08-31 is a Monday, 2026-09-05 a Saturday
    fn dt(m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    #[test]
    fn test_weekday_day_slice() {
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 9, 0), dt(8, 31, 10, 0)), 15);
    }

    #[test]
    fn test_weekday_night_slices() {
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 8, 0), dt(8, 31, 9, 0)), 10);
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 17, 0), dt(8, 31, 18, 0)), 10);
    }

    #[test]
    fn test_weekend_rates() {
        assert_eq!(FeeCalculator::reserved_fee(dt(9, 5, 10, 0), dt(9, 5, 11, 0)), 12);
        assert_eq!(FeeCalculator::reserved_fee(dt(9, 5, 17, 0), dt(9, 5, 18, 0)), 8);
    }

    #[test]
    fn test_day_boundary_is_start_of_slice() {
        // 16:00 slice is day rate, 17:00 slice is night rate
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 16, 0), dt(8, 31, 18, 0)), 15 + 10);
        // A slice starting 16:30 still counts as day
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 16, 30), dt(8, 31, 17, 30)), 15);
    }

    #[test]
    fn test_fee_spanning_friday_into_saturday() {
        // Fri 2026-09-04 16:00 to Sat 17:00: one weekday day slice, seven
        // weekday night, nine weekend night (00-08), eight weekend day (09-16)
        let fee = FeeCalculator::reserved_fee(dt(9, 4, 16, 0), dt(9, 5, 17, 0));
        assert_eq!(fee, 15 + 7 * 10 + 9 * 8 + 8 * 12);
    }

    #[test]
    fn test_partial_trailing_hour_is_not_billed() {
        // 90 minutes reserve a single slice
        assert_eq!(FeeCalculator::reserved_fee(dt(8, 31, 9, 0), dt(8, 31, 10, 30)), 15);
    }

    #[test]
    fn test_no_overage_within_reserved_window() {
        let rsvp = Reservation::new("A", "V", dt(8, 31, 9, 0), dt(8, 31, 11, 0));
        // 2h59m parked against a 2h window: floor division says no overage
        assert_eq!(FeeCalculator::total_fee(&rsvp, dt(8, 31, 11, 59)), 30);
    }

    #[test]
    fn test_overage_adds_whole_penalty_hours() {
        let rsvp = Reservation::new("A", "V", dt(8, 31, 9, 0), dt(8, 31, 11, 0));
        // 3h30m parked: one whole hour past the window
        assert_eq!(FeeCalculator::total_fee(&rsvp, dt(8, 31, 12, 30)), 30 + 20);
        // Two whole hours past
        assert_eq!(FeeCalculator::total_fee(&rsvp, dt(8, 31, 13, 0)), 30 + 40);
    }

    #[test]
    fn test_early_exit_still_pays_the_window() {
        let rsvp = Reservation::new("A", "V", dt(8, 31, 9, 0), dt(8, 31, 11, 0));
        assert_eq!(FeeCalculator::total_fee(&rsvp, dt(8, 31, 9, 30)), 30);
    }
}
