//! Staging buffers: fixed slots used to assemble a shipment before committing.

use crate::catalog::{CatalogError, CatalogItem, ItemCatalog, ItemCategory};
use crate::{ShipmentKind, ShippingConfig, SLOT_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// One staging cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItemSlot {
    /// Blank when unoccupied.
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub quantity: i32,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
}

impl PendingItemSlot {
    pub fn is_empty(&self) -> bool {
        self.item_id.trim().is_empty() || self.quantity <= 0
    }
}

/// Staging failures. Slot numbers in messages are 1-based.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StagingError {
    #[error("slot index {index} is out of range (expected 0..10)")]
    SlotOutOfRange { index: usize },
    #[error("quantity {quantity} cannot be negative")]
    NegativeQuantity { quantity: i32 },
    #[error("slot {slot}: quantity {quantity} exceeds the stack limit of {limit}")]
    StackLimitExceeded { slot: usize, quantity: i32, limit: u32 },
    #[error("slot {slot}: unknown item `{item_id}`")]
    UnknownItem { slot: usize, item_id: String },
    #[error("slot {slot}: {name} is not a product and cannot be shipped")]
    NotAProduct { slot: usize, name: String },
    #[error("no items staged for the {kind} shipment")]
    EmptyShipment { kind: ShipmentKind },
    #[error("{kind} shipment holds {requested} units but the cap is {cap}")]
    CapExceeded {
        kind: ShipmentKind,
        requested: u32,
        cap: u32,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A staged slot that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedLine {
    /// 1-based slot number.
    pub slot: usize,
    pub item_id: String,
    pub name: String,
    pub variant_id: Option<String>,
    pub quantity: u32,
}

/// Result of validating a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedShipment {
    pub kind: ShipmentKind,
    pub total_quantity: u32,
    pub lines: Vec<ValidatedLine>,
}

/// Fixed set of [`SLOT_COUNT`] slots bound to one shipment kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingShipmentBuffer {
    kind: ShipmentKind,
    slots: [PendingItemSlot; SLOT_COUNT],
}

impl PendingShipmentBuffer {
    pub fn new(kind: ShipmentKind) -> Self {
        Self {
            kind,
            slots: Default::default(),
        }
    }

    /// Rebuild from persisted slots. Extra slots are dropped, missing ones
    /// are empty, and empty-but-dirty slots are reset.
    pub fn from_slots(kind: ShipmentKind, slots: Vec<PendingItemSlot>) -> Self {
        let mut buffer = Self::new(kind);
        for (cell, slot) in buffer.slots.iter_mut().zip(slots) {
            if !slot.is_empty() {
                *cell = slot;
            }
        }
        buffer
    }

    pub fn to_slots(&self) -> Vec<PendingItemSlot> {
        self.slots.to_vec()
    }

    pub fn kind(&self) -> ShipmentKind {
        self.kind
    }

    pub fn slots(&self) -> &[PendingItemSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&PendingItemSlot> {
        self.slots.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(PendingItemSlot::is_empty)
    }

    /// Units across all occupied slots, without catalog checks.
    pub fn staged_quantity(&self) -> u32 {
        self.slots
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.quantity.unsigned_abs())
            .sum()
    }

    /// Put `quantity` of `item_id` into slot `index`.
    ///
    /// A blank id or zero quantity clears the slot. On error the slot keeps
    /// its previous contents.
    pub fn stage_slot(
        &mut self,
        index: usize,
        item_id: &str,
        quantity: i32,
        catalog: &dyn ItemCatalog,
        cfg: &ShippingConfig,
    ) -> Result<(), StagingError> {
        if index >= SLOT_COUNT {
            return Err(StagingError::SlotOutOfRange { index });
        }
        if quantity < 0 {
            return Err(StagingError::NegativeQuantity { quantity });
        }
        let slot_no = index + 1;
        if quantity == 0 || item_id.trim().is_empty() {
            self.slots[index] = PendingItemSlot::default();
            debug!(kind = %self.kind, slot = slot_no, "cleared staging slot");
            return Ok(());
        }
        if quantity.unsigned_abs() > cfg.slot_stack_limit {
            return Err(StagingError::StackLimitExceeded {
                slot: slot_no,
                quantity,
                limit: cfg.slot_stack_limit,
            });
        }
        let item = resolve_product(catalog, slot_no, item_id)?;
        debug!(kind = %self.kind, slot = slot_no, item_id, quantity, "staged item");
        self.slots[index] = PendingItemSlot {
            item_id: item_id.to_string(),
            quantity,
            display_name: Some(item.name),
            variant_id: item.variant_id,
        };
        Ok(())
    }

    /// Re-check every occupied slot against the catalog and the kind's cap.
    ///
    /// Slots that became empty are cleared. Display names are refreshed only
    /// when the whole buffer validates.
    pub fn validate(
        &mut self,
        catalog: &dyn ItemCatalog,
        cfg: &ShippingConfig,
    ) -> Result<ValidatedShipment, StagingError> {
        for slot in self.slots.iter_mut() {
            if slot.is_empty() {
                *slot = PendingItemSlot::default();
            }
        }

        let mut lines = Vec::new();
        let mut total: u32 = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_empty() {
                continue;
            }
            let slot_no = index + 1;
            let quantity = slot.quantity.unsigned_abs();
            if quantity > cfg.slot_stack_limit {
                return Err(StagingError::StackLimitExceeded {
                    slot: slot_no,
                    quantity: slot.quantity,
                    limit: cfg.slot_stack_limit,
                });
            }
            let item = resolve_product(catalog, slot_no, &slot.item_id)?;
            total = total.saturating_add(quantity);
            lines.push(ValidatedLine {
                slot: slot_no,
                item_id: slot.item_id.clone(),
                name: item.name,
                variant_id: item.variant_id,
                quantity,
            });
        }

        if total == 0 {
            return Err(StagingError::EmptyShipment { kind: self.kind });
        }
        let cap = self.kind.cap(cfg);
        if total > cap {
            return Err(StagingError::CapExceeded {
                kind: self.kind,
                requested: total,
                cap,
            });
        }

        for line in &lines {
            let slot = &mut self.slots[line.slot - 1];
            slot.display_name = Some(line.name.clone());
            slot.variant_id = line.variant_id.clone();
        }
        Ok(ValidatedShipment {
            kind: self.kind,
            total_quantity: total,
            lines,
        })
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

fn resolve_product(
    catalog: &dyn ItemCatalog,
    slot: usize,
    item_id: &str,
) -> Result<CatalogItem, StagingError> {
    let item = catalog
        .resolve(item_id)?
        .ok_or_else(|| StagingError::UnknownItem {
            slot,
            item_id: item_id.to_string(),
        })?;
    if item.category != ItemCategory::Product {
        return Err(StagingError::NotAProduct {
            slot,
            name: item.name,
        });
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_item("brick", CatalogItem::product("Brick"))
            .with_item(
                "brick_gold",
                CatalogItem {
                    name: "Gold Brick".into(),
                    category: ItemCategory::Product,
                    variant_id: Some("gold".into()),
                },
            )
            .with_item(
                "flour",
                CatalogItem {
                    name: "Flour".into(),
                    category: ItemCategory::Ingredient,
                    variant_id: None,
                },
            )
    }

    /// Catalog that forgets or breaks after construction.
    struct FlakyCatalog {
        fail: Cell<bool>,
        known: bool,
    }

    impl ItemCatalog for FlakyCatalog {
        fn resolve(&self, item_id: &str) -> Result<Option<CatalogItem>, CatalogError> {
            if self.fail.get() {
                return Err(CatalogError {
                    item_id: item_id.to_string(),
                    reason: "registry offline".into(),
                });
            }
            Ok(self.known.then(|| CatalogItem::product("Brick")))
        }
    }

    #[test]
    fn stage_caches_display_name() {
        let cfg = ShippingConfig::default();
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Consignment);
        buf.stage_slot(3, "brick_gold", 12, &catalog(), &cfg).unwrap();
        let slot = buf.slot(3).unwrap();
        assert_eq!(slot.display_name.as_deref(), Some("Gold Brick"));
        assert_eq!(slot.variant_id.as_deref(), Some("gold"));
        assert_eq!(buf.staged_quantity(), 12);
    }

    #[test]
    fn stage_rejects_bad_input_and_keeps_slot() {
        let cfg = ShippingConfig::default();
        let cat = catalog();
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Wholesale);
        buf.stage_slot(0, "brick", 5, &cat, &cfg).unwrap();

        assert_eq!(
            buf.stage_slot(10, "brick", 1, &cat, &cfg),
            Err(StagingError::SlotOutOfRange { index: 10 })
        );
        assert_eq!(
            buf.stage_slot(0, "brick", -1, &cat, &cfg),
            Err(StagingError::NegativeQuantity { quantity: -1 })
        );
        let err = buf.stage_slot(0, "brick", 21, &cat, &cfg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "slot 1: quantity 21 exceeds the stack limit of 20"
        );
        assert!(matches!(
            buf.stage_slot(0, "ghost", 1, &cat, &cfg),
            Err(StagingError::UnknownItem { slot: 1, .. })
        ));
        assert!(matches!(
            buf.stage_slot(0, "flour", 1, &cat, &cfg),
            Err(StagingError::NotAProduct { slot: 1, .. })
        ));
        assert_eq!(buf.slot(0).unwrap().quantity, 5);
        assert_eq!(buf.slot(0).unwrap().item_id, "brick");
    }

    #[test]
    fn validate_reports_cap_exceeded() {
        let cfg = ShippingConfig::default();
        let cat = catalog();
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Wholesale);
        for i in 0..6 {
            buf.stage_slot(i, "brick", 20, &cat, &cfg).unwrap();
        }
        let err = buf.validate(&cat, &cfg).unwrap_err();
        assert_eq!(
            err,
            StagingError::CapExceeded {
                kind: ShipmentKind::Wholesale,
                requested: 120,
                cap: 100
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("120") && msg.contains("100"), "{msg}");

        // The same load fits a consignment.
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Consignment);
        for i in 0..6 {
            buf.stage_slot(i, "brick", 20, &cat, &cfg).unwrap();
        }
        let ok = buf.validate(&cat, &cfg).unwrap();
        assert_eq!(ok.total_quantity, 120);
        assert_eq!(ok.lines.len(), 6);
        assert_eq!(ok.lines[5].slot, 6);
    }

    #[test]
    fn validate_empty_buffer_fails() {
        let cfg = ShippingConfig::default();
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Consignment);
        assert_eq!(
            buf.validate(&catalog(), &cfg),
            Err(StagingError::EmptyShipment {
                kind: ShipmentKind::Consignment
            })
        );
    }

    #[test]
    fn validate_names_offending_slot_one_based() {
        let cfg = ShippingConfig::default();
        let mut slots = vec![PendingItemSlot::default(); SLOT_COUNT];
        slots[0] = PendingItemSlot {
            item_id: "brick".into(),
            quantity: 4,
            ..Default::default()
        };
        slots[4] = PendingItemSlot {
            item_id: "retired_item".into(),
            quantity: 2,
            ..Default::default()
        };
        let mut buf = PendingShipmentBuffer::from_slots(ShipmentKind::Wholesale, slots);
        let err = buf.validate(&catalog(), &cfg).unwrap_err();
        assert_eq!(err.to_string(), "slot 5: unknown item `retired_item`");
        // Failed validation leaves staged content alone.
        assert_eq!(buf.staged_quantity(), 6);
    }

    #[test]
    fn validate_clears_dirty_empty_slots_and_refreshes_names() {
        let cfg = ShippingConfig::default();
        let mut slots = vec![PendingItemSlot::default(); SLOT_COUNT];
        slots[1] = PendingItemSlot {
            item_id: "brick".into(),
            quantity: 0,
            display_name: Some("stale".into()),
            variant_id: None,
        };
        slots[2] = PendingItemSlot {
            item_id: "brick".into(),
            quantity: 7,
            display_name: Some("stale".into()),
            variant_id: None,
        };
        let mut buf = PendingShipmentBuffer {
            kind: ShipmentKind::Wholesale,
            slots: Default::default(),
        };
        for (cell, slot) in buf.slots.iter_mut().zip(slots) {
            *cell = slot;
        }
        let ok = buf.validate(&catalog(), &cfg).unwrap();
        assert_eq!(ok.total_quantity, 7);
        assert_eq!(buf.slot(1).unwrap(), &PendingItemSlot::default());
        assert_eq!(buf.slot(2).unwrap().display_name.as_deref(), Some("Brick"));
    }

    #[test]
    fn catalog_failure_propagates() {
        let cfg = ShippingConfig::default();
        let cat = FlakyCatalog {
            fail: Cell::new(false),
            known: true,
        };
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Wholesale);
        buf.stage_slot(0, "brick", 3, &cat, &cfg).unwrap();
        cat.fail.set(true);
        let err = buf.validate(&cat, &cfg).unwrap_err();
        assert!(matches!(err, StagingError::Catalog(_)));
        assert_eq!(buf.staged_quantity(), 3);

        let forgetful = FlakyCatalog {
            fail: Cell::new(false),
            known: false,
        };
        assert!(matches!(
            buf.validate(&forgetful, &cfg),
            Err(StagingError::UnknownItem { slot: 1, .. })
        ));
    }

    #[test]
    fn from_slots_pads_and_truncates() {
        let short = vec![PendingItemSlot {
            item_id: "brick".into(),
            quantity: 2,
            ..Default::default()
        }];
        let buf = PendingShipmentBuffer::from_slots(ShipmentKind::Wholesale, short);
        assert_eq!(buf.slots().len(), SLOT_COUNT);
        assert_eq!(buf.staged_quantity(), 2);

        let long = vec![
            PendingItemSlot {
                item_id: "brick".into(),
                quantity: 1,
                ..Default::default()
            };
            SLOT_COUNT + 3
        ];
        let buf = PendingShipmentBuffer::from_slots(ShipmentKind::Wholesale, long);
        assert_eq!(buf.to_slots().len(), SLOT_COUNT);
        assert_eq!(buf.staged_quantity(), SLOT_COUNT as u32);
    }

    #[test]
    fn clear_resets_everything() {
        let cfg = ShippingConfig::default();
        let mut buf = PendingShipmentBuffer::new(ShipmentKind::Wholesale);
        buf.stage_slot(9, "brick", 20, &catalog(), &cfg).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf, PendingShipmentBuffer::new(ShipmentKind::Wholesale));
    }

    proptest! {
        #[test]
        fn blank_stage_always_empties(index in 0usize..SLOT_COUNT, prior in 1i32..=20) {
            let cfg = ShippingConfig::default();
            let cat = catalog();
            let mut buf = PendingShipmentBuffer::new(ShipmentKind::Consignment);
            buf.stage_slot(index, "brick", prior, &cat, &cfg).unwrap();
            buf.stage_slot(index, "", 0, &cat, &cfg).unwrap();
            prop_assert!(buf.slot(index).unwrap().is_empty());
            prop_assert!(buf.is_empty());
        }
    }
}
