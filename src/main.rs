#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use healthbridge::export::ExportStore;
use healthbridge::translate::{self, DateFormatter, OutputZone};
use healthbridge::types::{WorkoutQuery, WorkoutRecord};
use healthbridge::{Capabilities, HealthBridge, cli, utils};

#[macro_use]
extern crate healthbridge;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    utils::init_logging(cli.verbose, cli.quiet);

    let formatter = match cli.utc_offset.as_deref() {
        Some(s) => DateFormatter::new(OutputZone::Fixed(translate::parse_offset(s)?)),
        None => DateFormatter::default(),
    };
    let capabilities = if cli.no_routes {
        Capabilities::WORKOUTS_ONLY
    } else {
        Capabilities::default()
    };

    let export_handle = utils::open_export(&cli.export)?;
    dlog!(
        "export={} start={:?} end={:?} routes={} batch_size={}",
        export_handle.dir().display(),
        cli.start,
        cli.end,
        capabilities.route_queries,
        cli.batch_size
    );

    let root = export_handle.dir().to_path_buf();
    let batch_size = cli.batch_size;
    let store = tokio::task::spawn_blocking(move || ExportStore::open(&root, batch_size))
        .await
        .context("indexing export.xml")?
        .with_context(|| format!("opening export: {}", export_handle.dir().display()))?;

    let bridge = HealthBridge::new(store, capabilities, formatter);
    if !bridge.request_permissions().await? {
        bail!("Permission denied");
    }

    let workouts = bridge
        .get_workouts(WorkoutQuery {
            start_date: cli.start,
            end_date: cli.end,
        })
        .await?;

    if cli.summary {
        print_summary(&workouts);
    } else if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
    } else {
        println!("{}", serde_json::to_string(&workouts)?);
    }

    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn print_summary(workouts: &[WorkoutRecord]) {
    let shown = workouts
        .iter()
        .filter(|w| w.total_distance > 0.0 && w.duration > 0.0);

    let mut count = 0usize;
    for (i, w) in shown.enumerate() {
        let dur_str = utils::format_duration(chrono::Duration::milliseconds(
            (w.duration * 1000.0).round() as i64,
        ));
        let km = w.total_distance / 1000.0;
        println!(
            "{}\t{}\t{}\t{}\t{dur_str}\t{km:.2} km\t{} points",
            i + 1,
            w.start_date,
            w.end_date,
            w.workout_activity_type,
            w.location_count()
        );
        count += 1;
    }

    tracing::info!(
        workouts = workouts.len(),
        shown = count,
        "summary printed"
    );
}
