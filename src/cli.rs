use chrono::{DateTime, NaiveDate};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::export::DEFAULT_BATCH_SIZE;

#[derive(Parser, Debug)]
#[command(
    name = "healthbridge",
    about = "Read workouts, routes and GPS locations from an Apple Health export (ZIP or dir)"
)]
pub struct Cli {
    /// Path to the health export ZIP (or an already-extracted export directory).
    #[arg(value_name = "EXPORT")]
    pub export: PathBuf,

    /// Only workouts ending at or after this instant (epoch ms, YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_bound)]
    pub start: Option<i64>,

    /// Only workouts starting at or before this instant (epoch ms, YYYY-MM-DD or RFC 3339).
    #[arg(long, value_parser = parse_bound)]
    pub end: Option<i64>,

    /// Do not query routes or locations.
    #[arg(long)]
    pub no_routes: bool,

    /// Number of locations per delivered batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Render timestamps with this fixed offset (e.g. +0100) instead of the local zone.
    #[arg(long, value_name = "±HHMM", allow_hyphen_values = true)]
    pub utc_offset: Option<String>,

    /// Print one line per workout instead of JSON.
    #[arg(long)]
    pub summary: bool,

    /// Pretty-print the JSON output.
    #[arg(long, conflicts_with = "summary")]
    pub pretty: bool,

    /// Increase log verbosity (-v, -vv). Defaults to INFO.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (-q, -qq). Defaults to INFO.
    #[arg(short = 'q', long, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

/// Epoch milliseconds from `1514764800000`, `2018-01-01` (UTC midnight) or RFC 3339.
pub fn parse_bound(s: &str) -> Result<i64, String> {
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .ok_or_else(|| format!("invalid date: {s}"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| format!("expected epoch ms, YYYY-MM-DD or RFC 3339, got {s:?}"))
}
