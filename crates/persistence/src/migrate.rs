//! Upgrades of older save layouts.
//!
//! Schema 0 is the bare state blob written before saves carried a version.
//! Records from that era may lack `baseUnitPrice`; those are backfilled on
//! every load, whatever the schema.

use rust_decimal::Decimal;
use serde_json::Value;
use ship_core::{ShipmentRecord, ShippingState, NO_DAY};
use ship_econ::backfill_base_unit_price;
use tracing::{info, warn};

use crate::{PersistenceError, SaveEnvelope, SCHEMA_VERSION};

/// What a load had to repair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Schema the save was written with.
    pub from_version: u32,
    /// Records whose base price was reconstructed.
    pub backfilled_records: usize,
}

/// Decode any supported layout into a current envelope, returning it with
/// the schema it was written in.
pub fn upgrade(value: Value) -> Result<(SaveEnvelope, u32), PersistenceError> {
    let version = match value.get("schemaVersion") {
        None => 0,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(u32::MAX),
    };
    if version > SCHEMA_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }
    let mut envelope = if version == 0 {
        info!("upgrading unversioned save");
        SaveEnvelope {
            schema_version: 0,
            current_day: NO_DAY,
            state: serde_json::from_value::<ShippingState>(value)?,
        }
    } else {
        serde_json::from_value::<SaveEnvelope>(value)?
    };
    envelope.schema_version = SCHEMA_VERSION;
    Ok((envelope, version))
}

/// Fill in `base_unit_price` for the active record and every history entry
/// that lacks one. Returns how many records changed.
pub fn backfill_base_prices(state: &mut ShippingState, multiplier: Decimal) -> usize {
    let mut fixed = 0;
    let records = state
        .active_shipment
        .iter_mut()
        .chain(state.history.iter_mut().map(|e| &mut e.shipment));
    for record in records {
        if backfill_record(record, multiplier) {
            fixed += 1;
        }
    }
    if fixed > 0 {
        warn!(records = fixed, %multiplier, "backfilled missing base unit prices");
    }
    fixed
}

fn backfill_record(record: &mut ShipmentRecord, multiplier: Decimal) -> bool {
    if record.base_unit_price > 0 {
        return false;
    }
    record.base_unit_price = backfill_base_unit_price(record.kind, record.unit_price, multiplier);
    true
}
