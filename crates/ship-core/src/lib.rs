#![deny(warnings)]

//! Core domain models and invariants for the shipping desk.
//!
//! This crate defines the serializable shipment records, the persisted state
//! blob, tunables, and the collaborator traits the engine consumes. Staging of
//! items prior to commitment lives in [`staging`]; item lookups in [`catalog`].

pub mod catalog;
pub mod staging;

use chrono::{DateTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use catalog::{CatalogError, CatalogItem, ItemCatalog, ItemCategory, StaticCatalog};
pub use staging::{PendingItemSlot, PendingShipmentBuffer, StagingError, ValidatedLine, ValidatedShipment};

/// Whole currency units.
pub type Money = i64;

/// In-game day index.
pub type Day = i32;

/// Sentinel for "no day recorded" (no cooldown, nothing processed yet).
pub const NO_DAY: Day = -1;

/// Fixed number of staging slots per shipment kind.
pub const SLOT_COUNT: usize = 10;

/// The two shipment programs a player can commit goods to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentKind {
    /// Single instant payment, no risk, gated by a cooldown.
    Wholesale,
    /// Weekly installments at an elevated price with loss risk and a floor.
    Consignment,
}

impl ShipmentKind {
    /// Maximum units a single shipment of this kind may carry.
    pub fn cap(self, cfg: &ShippingConfig) -> u32 {
        match self {
            ShipmentKind::Wholesale => cfg.wholesale_cap,
            ShipmentKind::Consignment => cfg.consignment_cap,
        }
    }

    /// Number of payments that settle a shipment of this kind.
    pub fn installment_count(self, cfg: &ShippingConfig) -> u32 {
        match self {
            ShipmentKind::Wholesale => 1,
            ShipmentKind::Consignment => cfg.installment_count,
        }
    }
}

impl fmt::Display for ShipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipmentKind::Wholesale => f.write_str("wholesale"),
            ShipmentKind::Consignment => f.write_str("consignment"),
        }
    }
}

/// The single in-flight shipment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRecord {
    pub kind: ShipmentKind,
    /// Units committed (> 0).
    pub quantity: u32,
    /// Effective price per unit used for payout accounting.
    pub unit_price: Money,
    /// Pre-multiplier market price at creation; only used for the floor.
    /// Legacy saves lack it and carry 0 until migrated.
    #[serde(default)]
    pub base_unit_price: Money,
    /// Expected full payout, `quantity * unit_price`.
    pub total_value: Money,
    /// Cumulative amount transferred so far.
    pub total_paid: Money,
    pub payments_made: u32,
    pub created_day: Day,
}

impl ShipmentRecord {
    /// Payments still owed before the shipment settles.
    pub fn installments_remaining(&self, cfg: &ShippingConfig) -> u32 {
        self.kind
            .installment_count(cfg)
            .saturating_sub(self.payments_made)
    }

    /// Wholesale-equivalent value guaranteed to a consignment at settlement.
    /// Saturates at `Money::MAX`.
    pub fn floor_value(&self) -> Money {
        Money::from(self.quantity).saturating_mul(self.base_unit_price)
    }
}

/// Immutable snapshot of a completed shipment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub shipment: ShipmentRecord,
    pub completed_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Share of the expected value that never arrived, in whole percent.
    ///
    /// Negative when a floor top-up pushed the payout above the expected value.
    pub fn loss_percent(&self) -> i32 {
        let s = &self.shipment;
        if s.total_value <= 0 {
            return 0;
        }
        let paid_pct = (s.total_paid as f64 / s.total_value as f64 * 100.0).round();
        100 - paid_pct as i32
    }
}

/// Full persisted state of the shipping desk for one save context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingState {
    #[serde(default)]
    pub active_shipment: Option<ShipmentRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default = "no_day")]
    pub last_processed_day: Day,
    #[serde(default = "no_day")]
    pub wholesale_cooldown_end_day: Day,
    #[serde(default = "empty_slots")]
    pub pending_wholesale: Vec<PendingItemSlot>,
    #[serde(default = "empty_slots")]
    pub pending_consignment: Vec<PendingItemSlot>,
}

fn no_day() -> Day {
    NO_DAY
}

fn empty_slots() -> Vec<PendingItemSlot> {
    vec![PendingItemSlot::default(); SLOT_COUNT]
}

impl Default for ShippingState {
    fn default() -> Self {
        Self {
            active_shipment: None,
            history: Vec::new(),
            last_processed_day: NO_DAY,
            wholesale_cooldown_end_day: NO_DAY,
            pending_wholesale: empty_slots(),
            pending_consignment: empty_slots(),
        }
    }
}

/// Tunables for both shipment programs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShippingConfig {
    /// Unit cap for a wholesale shipment.
    pub wholesale_cap: u32,
    /// Unit cap for a consignment shipment.
    pub consignment_cap: u32,
    /// Largest quantity a single staging slot accepts.
    pub slot_stack_limit: u32,
    /// Price multiplier applied to consignment shipments.
    pub consignment_multiplier: Decimal,
    /// Weekly installments per consignment.
    pub installment_count: u32,
    /// Probability in [0,1] that an installment suffers a loss.
    pub loss_chance: f64,
    /// Inclusive lower bound of a loss, in percent.
    pub loss_min_pct: u32,
    /// Inclusive upper bound of a loss, in percent.
    pub loss_max_pct: u32,
    /// Days a wholesale sale blocks the next one.
    pub wholesale_cooldown_days: u32,
    /// Day of week on which consignment installments arrive.
    pub payout_weekday: Weekday,
    /// Seed for the loss-roll RNG.
    pub rng_seed: u64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            wholesale_cap: 100,
            consignment_cap: 200,
            slot_stack_limit: 20,
            consignment_multiplier: Decimal::new(16, 1),
            installment_count: 4,
            loss_chance: 0.25,
            loss_min_pct: 15,
            loss_max_pct: 60,
            wholesale_cooldown_days: 30,
            payout_weekday: Weekday::Mon,
            rng_seed: 42,
        }
    }
}

/// Validation errors for configuration invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Shipment and slot caps must be strictly positive.
    #[error("{0} must be > 0")]
    ZeroCap(&'static str),
    /// Consignments need at least one installment.
    #[error("installment count must be > 0")]
    NoInstallments,
    /// Probability outside [0, 1] or not finite.
    #[error("loss chance {0} must be within [0,1]")]
    InvalidChance(f64),
    /// Loss bounds inverted or above 100%.
    #[error("loss range {min}..={max} is invalid (expected min <= max <= 100)")]
    InvalidLossRange { min: u32, max: u32 },
    /// Multiplier must be strictly positive.
    #[error("consignment multiplier {0} must be > 0")]
    NonPositiveMultiplier(Decimal),
}

/// Validate shipping tunables.
pub fn validate_config(cfg: &ShippingConfig) -> Result<(), ValidationError> {
    if cfg.wholesale_cap == 0 {
        return Err(ValidationError::ZeroCap("wholesale_cap"));
    }
    if cfg.consignment_cap == 0 {
        return Err(ValidationError::ZeroCap("consignment_cap"));
    }
    if cfg.slot_stack_limit == 0 {
        return Err(ValidationError::ZeroCap("slot_stack_limit"));
    }
    if cfg.installment_count == 0 {
        return Err(ValidationError::NoInstallments);
    }
    if !cfg.loss_chance.is_finite() || !(0.0..=1.0).contains(&cfg.loss_chance) {
        return Err(ValidationError::InvalidChance(cfg.loss_chance));
    }
    if cfg.loss_min_pct > cfg.loss_max_pct || cfg.loss_max_pct > 100 {
        return Err(ValidationError::InvalidLossRange {
            min: cfg.loss_min_pct,
            max: cfg.loss_max_pct,
        });
    }
    if cfg.consignment_multiplier <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveMultiplier(
            cfg.consignment_multiplier,
        ));
    }
    Ok(())
}

/// Source of the current in-game day.
pub trait Calendar {
    fn current_day(&self) -> Day;
    fn day_of_week(&self) -> Weekday;
}

/// Source of the current market price per unit.
pub trait MarketPrice {
    fn current_unit_price(&self) -> Money;
}

/// A constant market price.
#[derive(Clone, Copy, Debug)]
pub struct FixedPrice(pub Money);

impl MarketPrice for FixedPrice {
    fn current_unit_price(&self) -> Money {
        self.0
    }
}

/// Fire-and-forget sink for player-facing messages.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

/// Render an amount with thousands separators, e.g. `$1,470,000`.
pub fn format_money(amount: Money) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    if amount < 0 {
        out.push('-');
    }
    out.push('$');
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn record(total_value: Money, total_paid: Money) -> ShipmentRecord {
        ShipmentRecord {
            kind: ShipmentKind::Consignment,
            quantity: 200,
            unit_price: 23_520,
            base_unit_price: 14_700,
            total_value,
            total_paid,
            payments_made: 4,
            created_day: 3,
        }
    }

    fn entry(total_value: Money, total_paid: Money) -> HistoryEntry {
        HistoryEntry {
            shipment: record(total_value, total_paid),
            completed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = ShippingConfig::default();
        validate_config(&cfg).unwrap();
        assert_eq!(ShipmentKind::Wholesale.cap(&cfg), 100);
        assert_eq!(ShipmentKind::Consignment.cap(&cfg), 200);
        assert_eq!(ShipmentKind::Wholesale.installment_count(&cfg), 1);
        assert_eq!(ShipmentKind::Consignment.installment_count(&cfg), 4);
    }

    #[test]
    fn config_rejects_bad_values() {
        let cfg = ShippingConfig {
            loss_chance: 1.5,
            ..ShippingConfig::default()
        };
        assert_eq!(
            validate_config(&cfg),
            Err(ValidationError::InvalidChance(1.5))
        );
        let cfg = ShippingConfig {
            loss_min_pct: 70,
            loss_max_pct: 60,
            ..ShippingConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ValidationError::InvalidLossRange { min: 70, max: 60 })
        ));
        let cfg = ShippingConfig {
            consignment_multiplier: Decimal::ZERO,
            ..ShippingConfig::default()
        };
        assert!(validate_config(&cfg).is_err());
        let cfg = ShippingConfig {
            installment_count: 0,
            ..ShippingConfig::default()
        };
        assert_eq!(validate_config(&cfg), Err(ValidationError::NoInstallments));
    }

    #[test]
    fn loss_percent_from_paid_ratio() {
        assert_eq!(entry(4_704_000, 4_704_000).loss_percent(), 0);
        assert_eq!(entry(1_000, 750).loss_percent(), 25);
        // Floor top-up can push the payout above nothing-lost.
        assert_eq!(entry(1_000, 1_100).loss_percent(), -10);
        assert_eq!(entry(0, 0).loss_percent(), 0);
    }

    #[test]
    fn legacy_record_without_base_price_deserializes() {
        let json = r#"{
            "kind": "Consignment",
            "quantity": 50,
            "unitPrice": 16000,
            "totalValue": 800000,
            "totalPaid": 0,
            "paymentsMade": 0,
            "createdDay": 12
        }"#;
        let rec: ShipmentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.base_unit_price, 0);
        assert_eq!(rec.installments_remaining(&ShippingConfig::default()), 4);
    }

    #[test]
    fn empty_blob_fills_sentinels() {
        let state: ShippingState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, ShippingState::default());
        assert_eq!(state.pending_wholesale.len(), SLOT_COUNT);
        assert_eq!(state.wholesale_cooldown_end_day, NO_DAY);
    }

    #[test]
    fn config_partial_overrides_keep_defaults() {
        let cfg: ShippingConfig =
            serde_json::from_str(r#"{"installment_count": 6, "payout_weekday": "Fri"}"#).unwrap();
        assert_eq!(cfg.installment_count, 6);
        assert_eq!(cfg.payout_weekday, Weekday::Fri);
        assert_eq!(cfg.wholesale_cap, 100);
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(0), "$0");
        assert_eq!(format_money(999), "$999");
        assert_eq!(format_money(1_470_000), "$1,470,000");
        assert_eq!(format_money(-1_058_400), "-$1,058,400");
    }

    proptest! {
        #[test]
        fn floor_value_is_quantity_times_base(q in 1u32..=200, base in 1i64..100_000) {
            let mut r = record(0, 0);
            r.quantity = q;
            r.base_unit_price = base;
            prop_assert_eq!(r.floor_value(), i64::from(q) * base);
        }
    }
}
