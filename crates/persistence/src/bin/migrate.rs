#![deny(warnings)]

//! Rewrite a save in the current schema, repairing legacy records.
//!
//! Usage: `migrate [context] [save-dir]`

use persistence::{default_save_dir, SaveStore, SCHEMA_VERSION};
use ship_core::ShippingConfig;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let context = args.next().unwrap_or_else(|| "default".to_string());
    let dir = args.next().unwrap_or_else(|| default_save_dir().to_string());

    let multiplier = ShippingConfig::default().consignment_multiplier;
    let store = SaveStore::new(&dir, multiplier);
    let Some(loaded) = store.open(&context)? else {
        println!("No save named `{}` in {}", context, dir);
        return Ok(());
    };
    let path = store.save(&context, &loaded.state, loaded.current_day)?;
    println!(
        "Save migrated from schema {} to {} at {} ({} completed shipments, {} repaired)",
        loaded.report.from_version,
        SCHEMA_VERSION,
        path.display(),
        loaded.state.history.len(),
        loaded.report.backfilled_records
    );
    Ok(())
}
