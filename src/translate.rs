//! Native sample → serializable record.
//!
//! Everything here is pure. Unknown activity codes degrade to `other`, a
//! missing distance degrades to `0`; nothing fails.

use crate::activity::ActivityType;
use crate::error::{HealthError, Result};
use crate::types::{
    Coordinate, LocationRecord, NativeLocation, NativeRoute, NativeWorkout, RouteRecord,
    WorkoutRecord,
};
use chrono::{DateTime, FixedOffset, Local, Offset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// `yyyy-MM-ddTHH:mm:ss.SSS±HHmm`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

static TIMESTAMP_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}[+-]\d{4}$")
        .expect("timestamp shape regex")
});

/// Zone the timestamps are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputZone {
    /// Host local zone, resolved per instant (DST aware).
    #[default]
    Local,
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateFormatter {
    zone: OutputZone,
}

impl DateFormatter {
    pub const fn new(zone: OutputZone) -> Self {
        Self { zone }
    }

    pub fn utc() -> Self {
        Self::new(OutputZone::Fixed(Utc.fix()))
    }

    pub fn format(&self, instant: DateTime<Utc>) -> String {
        match self.zone {
            OutputZone::Local => instant.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string(),
            OutputZone::Fixed(offset) => {
                instant.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string()
            }
        }
    }
}

/// Parse a timestamp produced by [`DateFormatter::format`]. Only that exact shape is accepted.
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>> {
    if !TIMESTAMP_SHAPE.is_match(s) {
        return Err(HealthError::invalid_argument(format!(
            "timestamp {s:?} is not yyyy-MM-ddTHH:mm:ss.SSS±HHmm"
        )));
    }
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| HealthError::invalid_argument(format!("timestamp {s:?}: {e}")))
}

/// Parse a `±HHmm` offset as used by `--utc-offset`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let bad = || HealthError::invalid_argument(format!("offset {s:?} is not ±HHmm"));

    let (sign, digits) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(bad()),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| bad())?;
    if minutes >= 60 {
        return Err(bad());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

fn uuid_string(uuid: &Uuid) -> String {
    uuid.hyphenated()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_string()
}

/// The record has no routes yet; the engine attaches them.
pub fn workout(sample: &NativeWorkout, fmt: &DateFormatter) -> WorkoutRecord {
    WorkoutRecord {
        uuid: uuid_string(&sample.uuid),
        start_date: fmt.format(sample.start),
        end_date: fmt.format(sample.end),
        workout_activity_type: ActivityType::from_code(sample.activity_code),
        total_distance: sample.total_distance_m.unwrap_or(0.0),
        duration: sample.duration_s,
        routes: None,
    }
}

pub fn route(sample: &NativeRoute, fmt: &DateFormatter) -> RouteRecord {
    RouteRecord {
        uuid: uuid_string(&sample.uuid),
        start_date: fmt.format(sample.start),
        end_date: fmt.format(sample.end),
        locations: Vec::new(),
    }
}

pub fn location(sample: &NativeLocation, fmt: &DateFormatter) -> LocationRecord {
    LocationRecord {
        coordinate: Coordinate {
            latitude: sample.latitude,
            longitude: sample.longitude,
        },
        timestamp: fmt.format(sample.timestamp),
        horizontal_accuracy: sample.horizontal_accuracy,
        vertical_accuracy: sample.vertical_accuracy,
        speed: sample.speed,
        course: sample.course,
        altitude: sample.altitude,
        floor: sample.floor,
    }
}
