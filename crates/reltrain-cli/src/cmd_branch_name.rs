use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use reltrain_core::cycle::release_branch_name;
use reltrain_core::ReleaseConfig;

/// Execute `reltrain branch-name`. Offline.
pub fn execute(config: &ReleaseConfig, date: Option<&str>) -> Result<()> {
    let date = resolve_date(date)?;
    println!("{}", release_branch_name(&config.release_branch_prefix, date));
    Ok(())
}

fn resolve_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD")),
        None => Ok(Local::now().date_naive()),
    }
}
