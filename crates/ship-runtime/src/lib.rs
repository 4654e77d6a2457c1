#![deny(warnings)]

//! Shipment engine runtime: the lifecycle state machine, the day driver, and
//! notification sinks.

pub mod driver;
pub mod lifecycle;
pub mod notify;

pub use driver::{advance_day, DayReport, SimCalendar};
pub use lifecycle::{InstallmentOutcome, LifecycleError, LifetimeTotals, ShipmentLifecycle};
pub use notify::{MessageLog, TracingNotifier};
