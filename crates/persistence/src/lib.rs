#![deny(warnings)]

//! Persistence layer: versioned JSON save files per save context, compact
//! bincode snapshots, and the legacy migration run on every load.

pub mod migrate;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ship_core::{Day, ShippingState, NO_DAY};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use migrate::{backfill_base_prices, upgrade, MigrationReport};

/// Schema written by this version. Version 0 is the bare, unversioned blob.
pub const SCHEMA_VERSION: u32 = 1;

/// Returns the default directory used for local saves.
pub fn default_save_dir() -> &'static str {
    "./saves"
}

/// On-disk wrapper around the state blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub schema_version: u32,
    /// Calendar day the driver had reached when the save was written.
    #[serde(default = "no_day")]
    pub current_day: Day,
    pub state: ShippingState,
}

fn no_day() -> Day {
    NO_DAY
}

/// A decoded save file.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedSave {
    pub state: ShippingState,
    /// `NO_DAY` for saves that never recorded one.
    pub current_day: Day,
    pub report: MigrationReport,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed save: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("save schema {found} is newer than the supported {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid save context `{0}` (use letters, digits, '-' or '_')")]
    InvalidContext(String),
}

/// Parse a save file body, upgrading and repairing it as needed.
pub fn decode_save(text: &str, multiplier: Decimal) -> Result<LoadedSave, PersistenceError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let (mut envelope, from_version) = upgrade(value)?;
    let backfilled = backfill_base_prices(&mut envelope.state, multiplier);
    Ok(LoadedSave {
        state: envelope.state,
        current_day: envelope.current_day,
        report: MigrationReport {
            from_version,
            backfilled_records: backfilled,
        },
    })
}

/// Render a state blob as a current-schema save file body.
pub fn encode_save(state: &ShippingState, current_day: Day) -> Result<String, PersistenceError> {
    let envelope = SaveEnvelope {
        schema_version: SCHEMA_VERSION,
        current_day,
        state: state.clone(),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Compact in-memory checkpoint of a state blob.
pub fn encode_snapshot(state: &ShippingState) -> Result<Vec<u8>, PersistenceError> {
    Ok(bincode::serialize(state)?)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<ShippingState, PersistenceError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Directory of JSON saves, one file per save context.
#[derive(Clone, Debug)]
pub struct SaveStore {
    dir: PathBuf,
    multiplier: Decimal,
}

impl SaveStore {
    /// `multiplier` is used to backfill base prices of legacy consignments.
    pub fn new(dir: impl AsRef<Path>, multiplier: Decimal) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            multiplier,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, context: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !context.is_empty()
            && context
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidContext(context.to_string()));
        }
        Ok(self.dir.join(format!("{context}.json")))
    }

    /// Read the save for `context`, or `None` when there is none.
    pub fn open(&self, context: &str) -> Result<Option<LoadedSave>, PersistenceError> {
        let path = self.path_for(context)?;
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let loaded = decode_save(&text, self.multiplier)?;
        info!(
            context,
            from_version = loaded.report.from_version,
            backfilled = loaded.report.backfilled_records,
            current_day = loaded.current_day,
            history = loaded.state.history.len(),
            active = loaded.state.active_shipment.is_some(),
            "save loaded"
        );
        Ok(Some(loaded))
    }

    /// Load the state for `context`, returning `(state, was_freshly_created)`.
    ///
    /// A missing file yields a blank state and `true`; nothing is written.
    pub fn load(&self, context: &str) -> Result<(ShippingState, bool), PersistenceError> {
        match self.open(context)? {
            Some(loaded) => Ok((loaded.state, false)),
            None => {
                info!(context, "no save found, starting fresh");
                Ok((ShippingState::default(), true))
            }
        }
    }

    /// Write `state` for `context` at `current_day`, replacing any previous save.
    pub fn save(
        &self,
        context: &str,
        state: &ShippingState,
        current_day: Day,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(context)?;
        fs::create_dir_all(&self.dir)?;
        let body = encode_save(state, current_day)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        debug!(context, current_day, path = %path.display(), "save written");
        Ok(path)
    }

    /// Remove the save for `context`. Returns whether a file existed.
    pub fn delete(&self, context: &str) -> Result<bool, PersistenceError> {
        let path = self.path_for(context)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}
