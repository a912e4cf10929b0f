// Small ops utility: print the load table of a plan for a date range.
//
// Usage:
//   cargo run --bin slot_report -- <date_from> [date_to] [plan] [db_path]
//
// db_path defaults to PRODUCTION_ALLOCATOR_DB_PATH / the user data directory.
// PRODUCTION_ALLOCATOR_LOG_FORMAT=json switches logs to JSON lines.

use anyhow::{bail, Context};
use production_allocator::api::ScheduleApi;
use production_allocator::db::get_default_db_path;
use production_allocator::logging;

fn main() -> anyhow::Result<()> {
    match std::env::var("PRODUCTION_ALLOCATOR_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    let mut args = std::env::args().skip(1);
    let Some(date_from) = args.next() else {
        bail!("usage: slot_report <date_from> [date_to] [plan] [db_path]");
    };
    let date_to = args.next().unwrap_or_else(|| date_from.clone());
    let plan = args.next().filter(|s| !s.trim().is_empty());
    let db_path = args.next().unwrap_or_else(get_default_db_path);

    let api = ScheduleApi::open(&db_path).with_context(|| format!("open {}", db_path))?;
    let table = api
        .load_table(plan.as_deref(), &date_from, &date_to)
        .context("load table")?;

    println!(
        "{:<12} {:<10} {:>10} {:>10} {:>10} {:>10}  {}",
        "date", "unit", "load_t", "soft_t", "hard_t", "free_t", "level"
    );
    for row in &table {
        println!(
            "{:<12} {:<10} {:>10.3} {:>10.3} {:>10.3} {:>10.3}  {}",
            row.slot.date.to_string(),
            row.slot.unit_code,
            row.load.tons(),
            row.soft_limit.tons(),
            row.hard_limit.tons(),
            row.remaining.tons(),
            row.level
        );
    }
    Ok(())
}
