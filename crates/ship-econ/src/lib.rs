#![deny(warnings)]

//! Payout arithmetic for the shipping desk.
//!
//! This module provides pure helpers for:
//! - Wholesale and consignment pricing
//! - Weekly installment sizing (truncating integer division)
//! - Randomized per-installment loss behind an injectable [`LossRng`]
//! - The wholesale-equivalent floor applied when a consignment settles

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use ship_core::{Money, ShipmentKind};
use std::collections::VecDeque;
use thiserror::Error;

/// Multipliers below this are treated as degenerate when inverting prices.
pub const MIN_MULTIPLIER: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Errors produced by pricing helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Market price must be strictly positive.
    #[error("invalid market price: {0}")]
    InvalidPrice(Money),
    /// Multiplier must be strictly positive.
    #[error("invalid price multiplier: {0}")]
    InvalidMultiplier(Decimal),
    /// Result does not fit in a money amount.
    #[error("payout overflow")]
    Overflow,
}

/// Full payout of a wholesale sale.
///
/// Example:
/// assert_eq!(wholesale_payout(100, 14_700).unwrap(), 1_470_000);
pub fn wholesale_payout(quantity: u32, market_price: Money) -> Result<Money, EconError> {
    Money::from(quantity)
        .checked_mul(market_price)
        .ok_or(EconError::Overflow)
}

/// Per-unit consignment price, `round(market_price * multiplier)`.
///
/// Halves round away from zero.
pub fn consignment_unit_price(market_price: Money, multiplier: Decimal) -> Result<Money, EconError> {
    if market_price <= 0 {
        return Err(EconError::InvalidPrice(market_price));
    }
    if multiplier <= Decimal::ZERO {
        return Err(EconError::InvalidMultiplier(multiplier));
    }
    Decimal::from(market_price)
        .checked_mul(multiplier)
        .ok_or(EconError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(EconError::Overflow)
}

/// Expected full payout of a consignment, `quantity * round(price * multiplier)`.
///
/// Example:
/// let v = consignment_value(200, 14_700, Decimal::new(16, 1)).unwrap();
/// assert_eq!(v, 4_704_000);
pub fn consignment_value(
    quantity: u32,
    market_price: Money,
    multiplier: Decimal,
) -> Result<Money, EconError> {
    let unit = consignment_unit_price(market_price, multiplier)?;
    Money::from(quantity)
        .checked_mul(unit)
        .ok_or(EconError::Overflow)
}

/// Size of one installment. The truncated remainder is never paid out.
pub fn weekly_installment(total_value: Money, installment_count: u32) -> Money {
    total_value / Money::from(installment_count.max(1))
}

/// Random source for loss rolls.
pub trait LossRng {
    /// Uniform draw in [0, 1) deciding whether a loss happens.
    fn unit(&mut self) -> f64;
    /// Uniform integer in [min, max] giving the loss severity in percent.
    fn severity(&mut self, min: u32, max: u32) -> u32;
}

/// Deterministic production source.
#[derive(Clone, Debug)]
pub struct SeededLossRng {
    rng: ChaCha8Rng,
}

impl SeededLossRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl LossRng for SeededLossRng {
    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn severity(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Replays a fixed sequence of outcomes: `0` is a clean week, anything
/// else is the loss percent for that week. Clean once exhausted.
#[derive(Clone, Debug, Default)]
pub struct ScriptedLossRng {
    rolls: VecDeque<u32>,
}

impl ScriptedLossRng {
    pub fn new(rolls: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl LossRng for ScriptedLossRng {
    fn unit(&mut self) -> f64 {
        match self.rolls.front() {
            Some(&pct) if pct > 0 => 0.0,
            Some(_) => {
                self.rolls.pop_front();
                1.0
            }
            None => 1.0,
        }
    }

    fn severity(&mut self, min: u32, _max: u32) -> u32 {
        self.rolls.pop_front().unwrap_or(min)
    }
}

/// Roll the loss for one installment: with probability `loss_chance` a
/// percent in `[min_pct, max_pct]`, otherwise 0.
pub fn roll_loss(loss_chance: f64, min_pct: u32, max_pct: u32, rng: &mut dyn LossRng) -> u32 {
    if loss_chance <= 0.0 {
        return 0;
    }
    if rng.unit() < loss_chance {
        rng.severity(min_pct, max_pct)
    } else {
        0
    }
}

/// `floor(expected * (1 - loss_percent / 100))`, computed exactly.
pub fn apply_loss(expected: Money, loss_percent: u32) -> Money {
    let kept = i128::from(100 - loss_percent.min(100));
    let scaled = (i128::from(expected) * kept).div_euclid(100);
    Money::try_from(scaled).unwrap_or(Money::MAX)
}

/// Wholesale-equivalent guarantee for a consignment.
pub fn floor_value(quantity: u32, base_unit_price: Money) -> Result<Money, EconError> {
    Money::from(quantity)
        .checked_mul(base_unit_price)
        .ok_or(EconError::Overflow)
}

/// Amount needed to lift `total_paid` up to the floor.
pub fn floor_top_up(total_paid: Money, floor_value: Money) -> Money {
    (floor_value - total_paid).max(0)
}

/// Recover the pre-multiplier price of a record saved before base prices
/// were tracked. Never returns less than 1.
pub fn backfill_base_unit_price(kind: ShipmentKind, unit_price: Money, multiplier: Decimal) -> Money {
    match kind {
        ShipmentKind::Wholesale => unit_price,
        ShipmentKind::Consignment => {
            if multiplier < MIN_MULTIPLIER {
                return unit_price.max(1);
            }
            Decimal::from(unit_price)
                .checked_div(multiplier)
                .map(|d| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
                .and_then(|d| d.to_i64())
                .unwrap_or(unit_price)
                .max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m16() -> Decimal {
        Decimal::new(16, 1)
    }

    #[test]
    fn wholesale_scenario_value() {
        assert_eq!(wholesale_payout(100, 14_700), Ok(1_470_000));
    }

    #[test]
    fn oversized_amounts_overflow_instead_of_wrapping() {
        let huge = Money::MAX / 50;
        assert_eq!(wholesale_payout(100, huge), Err(EconError::Overflow));
        assert_eq!(floor_value(100, huge), Err(EconError::Overflow));
        assert_eq!(wholesale_payout(50, huge), Ok(huge * 50));
    }

    #[test]
    fn consignment_scenario_value() {
        assert_eq!(consignment_unit_price(14_700, m16()).unwrap(), 23_520);
        assert_eq!(consignment_value(200, 14_700, m16()).unwrap(), 4_704_000);
        assert_eq!(weekly_installment(4_704_000, 4), 1_176_000);
    }

    #[test]
    fn consignment_rejects_bad_inputs() {
        assert_eq!(
            consignment_unit_price(0, m16()),
            Err(EconError::InvalidPrice(0))
        );
        assert_eq!(
            consignment_unit_price(100, Decimal::ZERO),
            Err(EconError::InvalidMultiplier(Decimal::ZERO))
        );
    }

    #[test]
    fn unit_price_rounds_half_away_from_zero() {
        // 5 * 1.5 = 7.5
        assert_eq!(consignment_unit_price(5, Decimal::new(15, 1)).unwrap(), 8);
        // 3 * 1.6 = 4.8
        assert_eq!(consignment_unit_price(3, m16()).unwrap(), 5);
    }

    #[test]
    fn installment_truncates() {
        assert_eq!(weekly_installment(1_003, 4), 250);
        assert_eq!(weekly_installment(1_003, 0), 1_003);
    }

    #[test]
    fn apply_loss_floors() {
        assert_eq!(apply_loss(1_176_000, 0), 1_176_000);
        assert_eq!(apply_loss(1_176_000, 60), 470_400);
        assert_eq!(apply_loss(999, 15), 849);
        assert_eq!(apply_loss(1_000, 100), 0);
        assert_eq!(apply_loss(1_000, 250), 0);
    }

    #[test]
    fn floor_scenario() {
        let floor = floor_value(200, 14_700).unwrap();
        assert_eq!(floor, 2_940_000);
        assert_eq!(floor_top_up(1_881_600, floor), 1_058_400);
        assert_eq!(floor_top_up(4_704_000, floor), 0);
    }

    #[test]
    fn scripted_rolls_replay_exactly() {
        let mut rng = ScriptedLossRng::new([0, 60, 15, 0]);
        assert_eq!(roll_loss(0.25, 15, 60, &mut rng), 0);
        assert_eq!(roll_loss(0.25, 15, 60, &mut rng), 60);
        assert_eq!(roll_loss(0.25, 15, 60, &mut rng), 15);
        assert_eq!(roll_loss(0.25, 15, 60, &mut rng), 0);
        assert_eq!(rng.remaining(), 0);
        assert_eq!(roll_loss(0.25, 15, 60, &mut rng), 0);
    }

    #[test]
    fn zero_chance_never_consumes() {
        let mut rng = ScriptedLossRng::new([40]);
        assert_eq!(roll_loss(0.0, 15, 60, &mut rng), 0);
        assert_eq!(rng.remaining(), 1);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = SeededLossRng::new(7);
        let mut b = SeededLossRng::new(7);
        let ra: Vec<u32> = (0..32).map(|_| roll_loss(0.25, 15, 60, &mut a)).collect();
        let rb: Vec<u32> = (0..32).map(|_| roll_loss(0.25, 15, 60, &mut b)).collect();
        assert_eq!(ra, rb);
    }

    #[test]
    fn backfill_inverts_multiplier() {
        assert_eq!(
            backfill_base_unit_price(ShipmentKind::Consignment, 23_520, m16()),
            14_700
        );
        assert_eq!(
            backfill_base_unit_price(ShipmentKind::Wholesale, 14_700, m16()),
            14_700
        );
        // Degenerate multipliers fall back to the stored price.
        assert_eq!(
            backfill_base_unit_price(ShipmentKind::Consignment, 23_520, Decimal::ZERO),
            23_520
        );
        assert_eq!(
            backfill_base_unit_price(ShipmentKind::Consignment, 0, m16()),
            1
        );
    }

    proptest! {
        #[test]
        fn loss_is_zero_or_in_bounds(seed in any::<u64>()) {
            let mut rng = SeededLossRng::new(seed);
            for _ in 0..256 {
                let pct = roll_loss(0.25, 15, 60, &mut rng);
                prop_assert!(pct == 0 || (15..=60).contains(&pct), "pct {}", pct);
            }
        }

        #[test]
        fn loss_never_increases_payout(expected in 0i64..10_000_000, pct in 0u32..=100) {
            let actual = apply_loss(expected, pct);
            prop_assert!(actual <= expected);
            prop_assert!(actual >= 0);
        }

        #[test]
        fn installments_never_exceed_total(total in 0i64..100_000_000, n in 1u32..12) {
            let each = weekly_installment(total, n);
            prop_assert!(each * i64::from(n) <= total);
            prop_assert!(total - each * i64::from(n) < i64::from(n));
        }
    }
}
