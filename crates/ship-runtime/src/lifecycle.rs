//! Shipment lifecycle: owns the single active shipment, the completed
//! history, the wholesale cooldown and the last-processed-day marker.
//!
//! ```text
//! Empty --create_wholesale--> Active(Wholesale) --1 payment--> archived, Empty
//! Empty --create_consignment--> Active(Consignment) --N payments--> archived, Empty
//! ```
//!
//! Creation failures are returned as [`LifecycleError`]. Processing calls made
//! out of state are no-ops, since the driving loop may call them speculatively.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use ship_core::{
    format_money, Day, HistoryEntry, ItemCatalog, Money, Notifier, PendingShipmentBuffer,
    ShipmentKind, ShipmentRecord, ShippingConfig, ShippingState, StagingError, NO_DAY,
};
use ship_econ::{
    apply_loss, consignment_unit_price, consignment_value, floor_top_up, floor_value, roll_loss,
    weekly_installment, wholesale_payout, EconError, LossRng, SeededLossRng,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::notify::TracingNotifier;

/// Why a shipment could not be created.
#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error("a {kind} shipment is already in progress")]
    ShipmentActive { kind: ShipmentKind },
    #[error("wholesale is on cooldown for {days_remaining} more day(s), until day {ends_on}")]
    CooldownActive { days_remaining: Day, ends_on: Day },
    #[error("shipment quantity must be > 0")]
    EmptyQuantity,
    #[error(transparent)]
    Econ(#[from] EconError),
    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// What one consignment installment paid. All zeros when nothing ran.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstallmentOutcome {
    /// Amount transferred, including any floor top-up.
    pub payout: Money,
    pub loss_percent: u32,
    pub floor_top_up: Money,
    /// 1-based installment number; 0 when nothing ran.
    pub installment: u32,
    /// Whether this installment settled the shipment.
    pub completed: bool,
}

/// Aggregates over the completed history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifetimeTotals {
    pub wholesale_completed: usize,
    pub consignment_completed: usize,
    pub total_paid: Money,
}

/// The shipment state machine.
///
/// Single-threaded and synchronous; the owner drives it one call at a time.
pub struct ShipmentLifecycle {
    config: ShippingConfig,
    active: Option<ShipmentRecord>,
    history: Vec<HistoryEntry>,
    wholesale_cooldown_end_day: Day,
    last_processed_day: Day,
    pending_wholesale: PendingShipmentBuffer,
    pending_consignment: PendingShipmentBuffer,
    rng: Box<dyn LossRng>,
    notifier: Box<dyn Notifier>,
    clock: fn() -> DateTime<Utc>,
}

impl ShipmentLifecycle {
    /// Empty lifecycle seeded from `config.rng_seed`, notifying via `tracing`.
    ///
    /// `config` is expected to have passed [`ship_core::validate_config`].
    pub fn new(config: ShippingConfig) -> Self {
        let rng = SeededLossRng::new(config.rng_seed);
        Self {
            config,
            active: None,
            history: Vec::new(),
            wholesale_cooldown_end_day: NO_DAY,
            last_processed_day: NO_DAY,
            pending_wholesale: PendingShipmentBuffer::new(ShipmentKind::Wholesale),
            pending_consignment: PendingShipmentBuffer::new(ShipmentKind::Consignment),
            rng: Box::new(rng),
            notifier: Box::new(TracingNotifier),
            clock: Utc::now,
        }
    }

    pub fn with_rng(mut self, rng: impl LossRng + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Override the completion timestamp source.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ShippingConfig {
        &self.config
    }

    pub fn active(&self) -> Option<&ShipmentRecord> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn wholesale_cooldown_end_day(&self) -> Day {
        self.wholesale_cooldown_end_day
    }

    pub fn last_processed_day(&self) -> Day {
        self.last_processed_day
    }

    /// Record that payments for `day` have been handled.
    pub fn mark_processed(&mut self, day: Day) {
        self.last_processed_day = day;
    }

    /// Days until wholesale opens again; 0 when it is open.
    pub fn cooldown_days_remaining(&self, current_day: Day) -> Day {
        if self.wholesale_cooldown_end_day == NO_DAY {
            return 0;
        }
        (self.wholesale_cooldown_end_day - current_day).max(0)
    }

    /// Expected size of the next payment before any loss.
    pub fn next_installment(&self) -> Option<Money> {
        let record = self.active.as_ref()?;
        Some(match record.kind {
            ShipmentKind::Wholesale => record.total_value,
            ShipmentKind::Consignment => {
                weekly_installment(record.total_value, self.config.installment_count)
            }
        })
    }

    pub fn totals(&self) -> LifetimeTotals {
        self.history
            .iter()
            .fold(LifetimeTotals::default(), |mut acc, entry| {
                match entry.shipment.kind {
                    ShipmentKind::Wholesale => acc.wholesale_completed += 1,
                    ShipmentKind::Consignment => acc.consignment_completed += 1,
                }
                acc.total_paid += entry.shipment.total_paid;
                acc
            })
    }

    pub fn staging(&self, kind: ShipmentKind) -> &PendingShipmentBuffer {
        match kind {
            ShipmentKind::Wholesale => &self.pending_wholesale,
            ShipmentKind::Consignment => &self.pending_consignment,
        }
    }

    pub fn staging_mut(&mut self, kind: ShipmentKind) -> &mut PendingShipmentBuffer {
        match kind {
            ShipmentKind::Wholesale => &mut self.pending_wholesale,
            ShipmentKind::Consignment => &mut self.pending_consignment,
        }
    }

    /// Stage one slot of the `kind` buffer using the configured stack limit.
    pub fn stage_slot(
        &mut self,
        kind: ShipmentKind,
        index: usize,
        item_id: &str,
        quantity: i32,
        catalog: &dyn ItemCatalog,
    ) -> Result<(), StagingError> {
        let buffer = match kind {
            ShipmentKind::Wholesale => &mut self.pending_wholesale,
            ShipmentKind::Consignment => &mut self.pending_consignment,
        };
        buffer.stage_slot(index, item_id, quantity, catalog, &self.config)
    }

    fn ensure_idle(&self) -> Result<(), LifecycleError> {
        match &self.active {
            Some(record) => Err(LifecycleError::ShipmentActive { kind: record.kind }),
            None => Ok(()),
        }
    }

    fn ensure_off_cooldown(&self, current_day: Day) -> Result<(), LifecycleError> {
        let end = self.wholesale_cooldown_end_day;
        if end != NO_DAY && current_day < end {
            return Err(LifecycleError::CooldownActive {
                days_remaining: end - current_day,
                ends_on: end,
            });
        }
        Ok(())
    }

    /// Book a wholesale sale. `quantity` is clamped to the wholesale cap.
    pub fn create_wholesale(
        &mut self,
        quantity: u32,
        market_price: Money,
        current_day: Day,
    ) -> Result<ShipmentRecord, LifecycleError> {
        self.ensure_idle()?;
        self.ensure_off_cooldown(current_day)?;
        if quantity == 0 {
            return Err(LifecycleError::EmptyQuantity);
        }
        if market_price <= 0 {
            return Err(EconError::InvalidPrice(market_price).into());
        }
        let quantity = quantity.min(self.config.wholesale_cap);
        let total_value = wholesale_payout(quantity, market_price)?;
        let record = ShipmentRecord {
            kind: ShipmentKind::Wholesale,
            quantity,
            unit_price: market_price,
            base_unit_price: market_price,
            total_value,
            total_paid: 0,
            payments_made: 0,
            created_day: current_day,
        };
        info!(
            quantity,
            unit_price = market_price,
            total_value = record.total_value,
            day = current_day,
            "wholesale shipment created"
        );
        self.notifier.notify(&format!(
            "Wholesale shipment of {} units booked for {}",
            quantity,
            format_money(record.total_value)
        ));
        self.active = Some(record);
        Ok(record)
    }

    /// Book a consignment. `quantity` is clamped to the consignment cap.
    /// Not subject to the wholesale cooldown.
    pub fn create_consignment(
        &mut self,
        quantity: u32,
        market_price: Money,
        multiplier: Decimal,
        current_day: Day,
    ) -> Result<ShipmentRecord, LifecycleError> {
        self.ensure_idle()?;
        if quantity == 0 {
            return Err(LifecycleError::EmptyQuantity);
        }
        let quantity = quantity.min(self.config.consignment_cap);
        let unit_price = consignment_unit_price(market_price, multiplier)?;
        let total_value = consignment_value(quantity, market_price, multiplier)?;
        // The settlement floor must be representable too.
        floor_value(quantity, market_price)?;
        let record = ShipmentRecord {
            kind: ShipmentKind::Consignment,
            quantity,
            unit_price,
            base_unit_price: market_price,
            total_value,
            total_paid: 0,
            payments_made: 0,
            created_day: current_day,
        };
        let installments = self.config.installment_count;
        info!(
            quantity,
            unit_price,
            base_unit_price = market_price,
            total_value,
            installments,
            day = current_day,
            "consignment shipment created"
        );
        self.notifier.notify(&format!(
            "Consignment shipment of {} units booked: {} weekly payments of up to {}",
            quantity,
            installments,
            format_money(weekly_installment(total_value, installments))
        ));
        self.active = Some(record);
        Ok(record)
    }

    /// Validate the `kind` staging buffer and book a shipment from it.
    ///
    /// Consignments use the configured multiplier. The buffer is cleared only
    /// when the shipment is created.
    pub fn create_from_staging(
        &mut self,
        kind: ShipmentKind,
        catalog: &dyn ItemCatalog,
        market_price: Money,
        current_day: Day,
    ) -> Result<ShipmentRecord, LifecycleError> {
        self.ensure_idle()?;
        if kind == ShipmentKind::Wholesale {
            self.ensure_off_cooldown(current_day)?;
        }
        let validated = match kind {
            ShipmentKind::Wholesale => self.pending_wholesale.validate(catalog, &self.config)?,
            ShipmentKind::Consignment => {
                self.pending_consignment.validate(catalog, &self.config)?
            }
        };
        debug!(
            %kind,
            total = validated.total_quantity,
            lines = validated.lines.len(),
            "staging validated"
        );
        let record = match kind {
            ShipmentKind::Wholesale => {
                self.create_wholesale(validated.total_quantity, market_price, current_day)?
            }
            ShipmentKind::Consignment => {
                let multiplier = self.config.consignment_multiplier;
                self.create_consignment(
                    validated.total_quantity,
                    market_price,
                    multiplier,
                    current_day,
                )?
            }
        };
        self.staging_mut(kind).clear();
        Ok(record)
    }

    /// Pay out an active wholesale shipment in full and start the cooldown.
    ///
    /// Returns 0 without side effects unless a wholesale shipment is active.
    pub fn process_wholesale_payment(&mut self, current_day: Day) -> Money {
        let record = match self.active.as_mut() {
            Some(r) if r.kind == ShipmentKind::Wholesale => r,
            _ => {
                debug!(day = current_day, "no active wholesale shipment to pay");
                return 0;
            }
        };
        record.total_paid = record.total_value;
        record.payments_made = 1;
        let payout = record.total_value;

        let cooldown = Day::try_from(self.config.wholesale_cooldown_days).unwrap_or(Day::MAX);
        self.wholesale_cooldown_end_day = current_day.saturating_add(cooldown);
        info!(
            payout,
            day = current_day,
            cooldown_end_day = self.wholesale_cooldown_end_day,
            "wholesale payment processed"
        );
        self.complete_active();
        payout
    }

    /// Pay one weekly installment of an active consignment.
    ///
    /// The final installment tops the cumulative payout up to the
    /// wholesale-equivalent floor and archives the shipment. Returns zeros
    /// without side effects unless a consignment is active.
    pub fn process_consignment_payment(&mut self) -> InstallmentOutcome {
        let installments = self.config.installment_count;
        let record = match self.active.as_mut() {
            Some(r) if r.kind == ShipmentKind::Consignment => r,
            _ => {
                debug!("no active consignment shipment to pay");
                return InstallmentOutcome::default();
            }
        };
        if record.payments_made >= installments {
            warn!(
                payments_made = record.payments_made,
                installments, "consignment already fully paid; archiving"
            );
            self.complete_active();
            return InstallmentOutcome::default();
        }

        let expected = weekly_installment(record.total_value, installments);
        let loss_percent = roll_loss(
            self.config.loss_chance,
            self.config.loss_min_pct,
            self.config.loss_max_pct,
            self.rng.as_mut(),
        );
        let actual = apply_loss(expected, loss_percent);
        record.total_paid += actual;
        record.payments_made += 1;
        let installment = record.payments_made;
        let completed = installment >= installments;

        let mut top_up = 0;
        if completed {
            match floor_value(record.quantity, record.base_unit_price) {
                Ok(floor) => {
                    top_up = floor_top_up(record.total_paid, floor);
                    record.total_paid += top_up;
                }
                Err(err) => warn!(
                    quantity = record.quantity,
                    base_unit_price = record.base_unit_price,
                    %err,
                    "floor not representable; skipping top-up"
                ),
            }
        }
        let total_paid = record.total_paid;

        info!(
            installment,
            installments,
            expected,
            actual,
            loss_percent,
            floor_top_up = top_up,
            total_paid,
            "consignment payment processed"
        );
        if loss_percent > 0 {
            self.notifier.notify(&format!(
                "Consignment week {installment}: {loss_percent}% of the goods were lost, received {} of {}",
                format_money(actual),
                format_money(expected)
            ));
        }
        if top_up > 0 {
            self.notifier.notify(&format!(
                "Floor protection added {} to the final consignment payment",
                format_money(top_up)
            ));
        }
        if completed {
            self.complete_active();
        }

        InstallmentOutcome {
            payout: actual + top_up,
            loss_percent,
            floor_top_up: top_up,
            installment,
            completed,
        }
    }

    /// Archive the active shipment into history and return to empty.
    fn complete_active(&mut self) {
        let Some(shipment) = self.active.take() else {
            return;
        };
        let entry = HistoryEntry {
            shipment,
            completed_at: (self.clock)(),
        };
        info!(
            kind = %shipment.kind,
            total_paid = shipment.total_paid,
            loss_percent = entry.loss_percent(),
            "shipment completed"
        );
        let title = match shipment.kind {
            ShipmentKind::Wholesale => "Wholesale",
            ShipmentKind::Consignment => "Consignment",
        };
        self.notifier.notify(&format!(
            "{title} shipment settled: {} paid in total",
            format_money(shipment.total_paid)
        ));
        self.history.push(entry);
    }

    /// Reset to a blank desk: no shipment, no history, no cooldown, nothing
    /// staged. Meant for save boundaries, not gameplay.
    pub fn clear_all(&mut self) {
        self.active = None;
        self.history.clear();
        self.wholesale_cooldown_end_day = NO_DAY;
        self.last_processed_day = NO_DAY;
        self.pending_wholesale.clear();
        self.pending_consignment.clear();
        debug!("shipping state cleared");
    }

    /// Replace all owned state with a loaded blob.
    pub fn restore(&mut self, state: ShippingState) {
        self.active = state.active_shipment;
        self.history = state.history;
        self.last_processed_day = state.last_processed_day;
        self.wholesale_cooldown_end_day = state.wholesale_cooldown_end_day;
        self.pending_wholesale =
            PendingShipmentBuffer::from_slots(ShipmentKind::Wholesale, state.pending_wholesale);
        self.pending_consignment = PendingShipmentBuffer::from_slots(
            ShipmentKind::Consignment,
            state.pending_consignment,
        );
        debug!(
            active = self.active.is_some(),
            history = self.history.len(),
            "shipping state restored"
        );
    }

    /// Copy out everything that needs persisting.
    pub fn snapshot(&self) -> ShippingState {
        ShippingState {
            active_shipment: self.active,
            history: self.history.clone(),
            last_processed_day: self.last_processed_day,
            wholesale_cooldown_end_day: self.wholesale_cooldown_end_day,
            pending_wholesale: self.pending_wholesale.to_slots(),
            pending_consignment: self.pending_consignment.to_slots(),
        }
    }
}

impl std::fmt::Debug for ShipmentLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentLifecycle")
            .field("active", &self.active)
            .field("history", &self.history.len())
            .field("wholesale_cooldown_end_day", &self.wholesale_cooldown_end_day)
            .field("last_processed_day", &self.last_processed_day)
            .finish_non_exhaustive()
    }
}
