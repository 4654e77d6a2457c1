#![deny(warnings)]

//! Headless driver: stages goods, books a shipment, advances days against the
//! shipping engine and saves the result.

use anyhow::{bail, Context, Result};
use chrono::Weekday;
use persistence::{default_save_dir, SaveStore};
use serde::Deserialize;
use ship_core::*;
use ship_runtime::{advance_day, LifetimeTotals, ShipmentLifecycle, SimCalendar};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

struct Args {
    days: u32,
    seed: Option<u64>,
    kind: ShipmentKind,
    quantity: u32,
    price: Money,
    save_dir: String,
    context: String,
    config: Option<String>,
    reset: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            days: 35,
            seed: None,
            kind: ShipmentKind::Consignment,
            quantity: 200,
            price: 14_700,
            save_dir: default_save_dir().to_string(),
            context: "default".to_string(),
            config: None,
            reset: false,
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--days" => args.days = value()?.parse()?,
            "--seed" => args.seed = Some(value()?.parse()?),
            "--kind" => {
                args.kind = match value()?.as_str() {
                    "wholesale" => ShipmentKind::Wholesale,
                    "consignment" => ShipmentKind::Consignment,
                    other => bail!("unknown shipment kind `{other}`"),
                }
            }
            "--quantity" => args.quantity = value()?.parse()?,
            "--price" => args.price = value()?.parse()?,
            "--save-dir" => args.save_dir = value()?,
            "--context" => args.context = value()?,
            "--config" => args.config = Some(value()?),
            "--reset" => args.reset = true,
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    Ok(args)
}

/// Optional YAML file with tunables and the item catalog.
#[derive(Deserialize, Default)]
struct DeskFile {
    #[serde(default)]
    shipping: ShippingConfig,
    #[serde(default)]
    catalog: Option<StaticCatalog>,
}

fn default_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_item("brick", CatalogItem::product("Packaged Brick"))
        .with_item(
            "brick_premium",
            CatalogItem {
                name: "Premium Brick".to_string(),
                category: ItemCategory::Product,
                variant_id: Some("premium".to_string()),
            },
        )
        .with_item(
            "baking_soda",
            CatalogItem {
                name: "Baking Soda".to_string(),
                category: ItemCategory::Ingredient,
                variant_id: None,
            },
        )
}

fn load_desk_file(path: Option<&str>) -> Result<(ShippingConfig, StaticCatalog)> {
    let file = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {p}"))?;
            serde_yaml::from_str::<DeskFile>(&text).with_context(|| format!("parsing {p}"))?
        }
        None => DeskFile::default(),
    };
    validate_config(&file.shipping)?;
    let catalog = file.catalog.unwrap_or_else(default_catalog);
    Ok((file.shipping, catalog))
}

/// Spread `quantity` of the first shippable item over the staging slots.
fn stage_goods(
    desk: &mut ShipmentLifecycle,
    kind: ShipmentKind,
    quantity: u32,
    catalog: &StaticCatalog,
) -> Result<()> {
    let item = catalog
        .product_ids()
        .next()
        .context("catalog has no shippable products")?
        .to_string();
    let per_slot = desk.config().slot_stack_limit;
    let mut left = quantity;
    for index in 0..SLOT_COUNT {
        if left == 0 {
            break;
        }
        let take = left.min(per_slot);
        desk.stage_slot(kind, index, &item, i32::try_from(take)?, catalog)?;
        left -= take;
    }
    if left > 0 {
        warn!(unstaged = left, "not enough staging slots for the requested quantity");
    }
    Ok(())
}

fn weekday_for(day: Day) -> Weekday {
    (0..day.rem_euclid(7)).fold(Weekday::Mon, |w, _| w.succ())
}

/// Outcome of one CLI run.
struct Session {
    booked: Option<ShipmentRecord>,
    end_day: Day,
    totals: LifetimeTotals,
}

/// Day the next run resumes from: the saved driver day, else the last
/// processed day for saves that predate it.
fn resume_day(saved_day: Day, last_processed_day: Day) -> Day {
    if saved_day != NO_DAY {
        saved_day
    } else {
        last_processed_day.max(0)
    }
}

fn run_session(args: &Args, cfg: ShippingConfig, catalog: &StaticCatalog) -> Result<Session> {
    let store = SaveStore::new(&args.save_dir, cfg.consignment_multiplier);
    let mut desk = ShipmentLifecycle::new(cfg);
    let mut start = 0;
    match store.open(&args.context)? {
        Some(loaded) => {
            start = resume_day(loaded.current_day, loaded.state.last_processed_day);
            desk.restore(loaded.state);
        }
        None => info!(context = %args.context, "created new shipping desk"),
    }
    if args.reset {
        desk.clear_all();
        start = 0;
    }

    let mut calendar = SimCalendar::new(start, weekday_for(start));
    let market = FixedPrice(args.price);

    let mut booked = None;
    if desk.active().is_none() {
        stage_goods(&mut desk, args.kind, args.quantity, catalog)?;
        match desk.create_from_staging(args.kind, catalog, market.current_unit_price(), start) {
            Ok(rec) => {
                println!(
                    "Booked {} shipment on day {} | units: {} | unit price: {} | value: {}",
                    rec.kind,
                    start,
                    rec.quantity,
                    format_money(rec.unit_price),
                    format_money(rec.total_value)
                );
                booked = Some(rec);
            }
            Err(e) => println!("Shipment not booked: {e}"),
        }
    }

    for _ in 0..args.days {
        calendar.advance();
        if let Some(report) = advance_day(&mut desk, &calendar) {
            let loss = report.installment.map_or(0, |i| i.loss_percent);
            let top_up = report.installment.map_or(0, |i| i.floor_top_up);
            println!(
                "Day {:>4} | paid: {} | loss: {}% | floor top-up: {}",
                report.day,
                format_money(report.total_payout()),
                loss,
                format_money(top_up)
            );
        }
    }

    let end_day = calendar.current_day();
    let path = store.save(&args.context, &desk.snapshot(), end_day)?;
    let totals = desk.totals();
    println!(
        "Desk | day {} | completed: {} wholesale, {} consignment | lifetime paid: {} | cooldown: {} day(s) | saved: {}",
        end_day,
        totals.wholesale_completed,
        totals.consignment_completed,
        format_money(totals.total_paid),
        desk.cooldown_days_remaining(end_day),
        path.display()
    );
    if let Some(active) = desk.active() {
        println!(
            "Active {} | paid {} of {} | installments left: {}",
            active.kind,
            format_money(active.total_paid),
            format_money(active.total_value),
            active.installments_remaining(desk.config())
        );
    }

    Ok(Session {
        booked,
        end_day,
        totals,
    })
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();

    let args = parse_args()?;
    info!(build = env!("GIT_SHA"), days = args.days, kind = %args.kind, "starting CLI");

    let (mut cfg, catalog) = load_desk_file(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        cfg.rng_seed = seed;
    }
    let session = run_session(&args, cfg, &catalog)?;
    info!(
        booked = session.booked.is_some(),
        end_day = session.end_day,
        completed = session.totals.wholesale_completed + session.totals.consignment_completed,
        "run finished"
    );
    Ok(())
}
