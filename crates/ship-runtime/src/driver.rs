//! Day-advance driver.
//!
//! The lifecycle's processing calls do not guard against running twice in a
//! day; [`advance_day`] does, via the lifecycle's last-processed-day marker.

use chrono::Weekday;
use ship_core::{Calendar, Day, Money, ShipmentKind};
use tracing::debug;

use crate::lifecycle::{InstallmentOutcome, ShipmentLifecycle};

/// A calendar that moves forward one day at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimCalendar {
    day: Day,
    weekday: Weekday,
}

impl SimCalendar {
    pub fn new(day: Day, weekday: Weekday) -> Self {
        Self { day, weekday }
    }

    pub fn advance(&mut self) {
        self.day += 1;
        self.weekday = self.weekday.succ();
    }
}

impl Calendar for SimCalendar {
    fn current_day(&self) -> Day {
        self.day
    }

    fn day_of_week(&self) -> Weekday {
        self.weekday
    }
}

/// Payments made on one day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DayReport {
    pub day: Day,
    pub wholesale_payout: Money,
    pub installment: Option<InstallmentOutcome>,
}

impl DayReport {
    pub fn total_payout(&self) -> Money {
        self.wholesale_payout + self.installment.map_or(0, |i| i.payout)
    }
}

/// Run whatever payment is due today.
///
/// Wholesale pays on the first day after creation. Consignment pays on each
/// configured payout weekday after creation. Returns `None` when nothing was
/// due or the day was already processed.
pub fn advance_day(
    lifecycle: &mut ShipmentLifecycle,
    calendar: &dyn Calendar,
) -> Option<DayReport> {
    let day = calendar.current_day();
    if day == lifecycle.last_processed_day() {
        debug!(day, "day already processed");
        return None;
    }
    let active = *lifecycle.active()?;
    if day <= active.created_day {
        return None;
    }

    let report = match active.kind {
        ShipmentKind::Wholesale => DayReport {
            day,
            wholesale_payout: lifecycle.process_wholesale_payment(day),
            installment: None,
        },
        ShipmentKind::Consignment => {
            if calendar.day_of_week() != lifecycle.config().payout_weekday {
                return None;
            }
            DayReport {
                day,
                wholesale_payout: 0,
                installment: Some(lifecycle.process_consignment_payment()),
            }
        }
    };
    lifecycle.mark_processed(day);
    Some(report)
}
