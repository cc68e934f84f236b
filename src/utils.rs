use anyhow::{Context, Result, bail};
use chrono::Duration;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};
use zip::ZipArchive;

#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*);
    };
}

/// Initialize colorful logging.
///
/// Default level is INFO.
/// - `-v` => DEBUG
/// - `-vv` => TRACE
/// - `-q` => WARN
/// - `-qq` => ERROR
///
/// `RUST_LOG` overrides everything (e.g. `RUST_LOG=trace`).
pub fn init_logging(verbose: u8, quiet: u8) {
    let net = i16::from(verbose) - i16::from(quiet);
    let level = match net {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        2..=i16::MAX => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,healthbridge={level}")));

    let show_src = matches!(level, "debug" | "trace");

    fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(io::stderr)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_file(show_src)
        .with_line_number(show_src)
        .compact()
        .init();
}

/// Handle that keeps a tempdir alive if we extracted a ZIP.
pub struct ExportHandle {
    dir: PathBuf,
    _tmp: Option<TempDir>,
}

impl ExportHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Accepts either:
/// - a directory containing `export.xml` (and usually `workout-routes/`)
/// - a directory whose single subdirectory is such an export (`apple_health_export/`)
/// - a `.zip` file of either, which we extract to a temp dir
pub fn open_export(path: &Path) -> Result<ExportHandle> {
    if path.is_dir() {
        let root = find_export_root(path).with_context(|| {
            format!("Directory doesn't look like a health export: {}", path.display())
        })?;
        tracing::info!(path = %root.display(), "using export directory");
        return Ok(ExportHandle {
            dir: root,
            _tmp: None,
        });
    }

    if path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("zip"))
        != Some(true)
    {
        bail!(
            "Export path must be a directory or a .zip file: {}",
            path.display()
        );
    }

    let zip_file = File::open(path).with_context(|| format!("opening zip: {}", path.display()))?;
    let mut zip =
        ZipArchive::new(zip_file).with_context(|| format!("reading zip: {}", path.display()))?;

    let tmp = tempfile::tempdir().context("creating tempdir for export zip")?;
    tracing::info!(
        zip = %path.display(),
        tmp = %tmp.path().display(),
        entries = zip.len(),
        "extracting export zip"
    );

    for i in 0..zip.len() {
        let mut f = zip.by_index(i).context("reading zip entry")?;

        // Prevent Zip Slip / path traversal.
        let Some(rel) = f.enclosed_name() else {
            tracing::warn!(name = %f.name(), "skipping unsafe zip entry path");
            continue;
        };

        let out_path = tmp.path().join(&rel);

        if f.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("creating dir: {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("creating file: {}", out_path.display()))?;
        io::copy(&mut f, &mut out)
            .with_context(|| format!("extracting file: {}", out_path.display()))?;
    }

    let Some(root) = find_export_root(tmp.path()) else {
        bail!(
            "ZIP extracted but doesn't look like a health export root: {}",
            tmp.path().display()
        );
    };

    tracing::info!(export_root = %root.display(), "export ready");

    Ok(ExportHandle {
        dir: root,
        _tmp: Some(tmp),
    })
}

fn find_export_root(dir: &Path) -> Option<PathBuf> {
    if looks_like_export(dir) {
        return Some(dir.to_path_buf());
    }

    // Common case: the export sits in a single top-level dir.
    let mut dirs = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect::<Vec<_>>();

    if dirs.len() == 1 && looks_like_export(&dirs[0]) {
        dirs.pop()
    } else {
        None
    }
}

fn looks_like_export(dir: &Path) -> bool {
    dir.join("export.xml").is_file()
}

/// Map a `FileReference` path (`/workout-routes/route_….gpx`) into the export.
pub fn map_file_reference_to_export(export_dir: &Path, reference: &str) -> Option<PathBuf> {
    let rel = reference.trim_start_matches('/');
    if rel.is_empty() || Path::new(rel).components().any(|c| c == std::path::Component::ParentDir) {
        return None;
    }
    Some(export_dir.join(rel))
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().unsigned_abs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Meters per unit for the distance units health exports use.
pub fn meters_per(unit: &str) -> Option<f64> {
    match unit {
        "m" => Some(1.0),
        "km" => Some(1000.0),
        "cm" => Some(0.01),
        "mi" => Some(1609.344),
        "yd" => Some(0.9144),
        "ft" => Some(0.3048),
        _ => None,
    }
}

/// Seconds per unit for the duration units health exports use.
pub fn seconds_per(unit: &str) -> Option<f64> {
    match unit {
        "s" => Some(1.0),
        "min" => Some(60.0),
        "hr" | "h" => Some(3600.0),
        "ms" => Some(0.001),
        _ => None,
    }
}
