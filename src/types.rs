use crate::activity::ActivityType;
use crate::error::HealthError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query bounds as they arrive over the bridge: epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<i64>,
}

/// Resolved query bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl QueryWindow {
    pub const UNBOUNDED: Self = Self {
        start: None,
        end: None,
    };

    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }

    /// True when a sample spanning `start..=end` intersects the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.is_none_or(|lower| end >= lower) && self.end.is_none_or(|upper| start <= upper)
    }
}

impl TryFrom<WorkoutQuery> for QueryWindow {
    type Error = HealthError;

    fn try_from(q: WorkoutQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            start: q.start_date.map(millis_to_utc).transpose()?,
            end: q.end_date.map(millis_to_utc).transpose()?,
        })
    }
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, HealthError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| HealthError::invalid_argument(format!("timestamp out of range: {ms}")))
}

/// Sample types a caller can ask read access for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Workout,
    WorkoutRoute,
}

/// One workout as the store hands it over.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeWorkout {
    pub uuid: Uuid,
    pub activity_code: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Meters, when the store measured it.
    pub total_distance_m: Option<f64>,
    pub duration_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeRoute {
    pub uuid: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A GPS fix. Negative accuracy, speed and course mean "invalid".
#[derive(Debug, Clone, PartialEq)]
pub struct NativeLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
    pub floor: Option<i32>,
}

/// Whatever the workout query produced. Anything but a workout is a shape error.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeSample {
    Workout(NativeWorkout),
    Other { type_name: String },
}

/// One delivery from a route-location query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationBatch {
    pub locations: Vec<NativeLocation>,
    /// No further batches follow.
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub uuid: String,
    pub start_date: String,
    pub end_date: String,
    pub workout_activity_type: ActivityType,
    /// Meters.
    pub total_distance: f64,
    /// Seconds.
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<RouteRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecord {
    pub uuid: String,
    pub start_date: String,
    pub end_date: String,
    pub locations: Vec<LocationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub coordinate: Coordinate,
    pub timestamp: String,
    pub horizontal_accuracy: f64,
    pub vertical_accuracy: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
}

impl WorkoutRecord {
    pub fn location_count(&self) -> usize {
        self.routes
            .iter()
            .flatten()
            .map(|r| r.locations.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_query_deserializes_partial_bounds() {
        let q: WorkoutQuery = serde_json::from_str(r#"{"startDate":1514764800000}"#).unwrap();
        assert_eq!(q.start_date, Some(1_514_764_800_000));
        assert_eq!(q.end_date, None);

        let q: WorkoutQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q, WorkoutQuery::default());
    }

    #[test]
    fn test_window_from_query() {
        let w = QueryWindow::try_from(WorkoutQuery {
            start_date: Some(1_514_764_800_000),
            end_date: None,
        })
        .unwrap();
        assert_eq!(w.start, Some(utc(1_514_764_800_000)));
        assert_eq!(w.end, None);
        assert!(!w.is_inverted());
    }

    #[test]
    fn test_window_rejects_out_of_range_millis() {
        let err = QueryWindow::try_from(WorkoutQuery {
            start_date: Some(i64::MAX),
            end_date: None,
        })
        .unwrap_err();
        assert!(matches!(err, HealthError::InvalidArgument(_)));
    }

    #[test]
    fn test_window_inverted() {
        let w = QueryWindow {
            start: Some(utc(2_000)),
            end: Some(utc(1_000)),
        };
        assert!(w.is_inverted());
        assert!(!QueryWindow::UNBOUNDED.is_inverted());
    }

    #[test]
    fn test_window_overlaps() {
        let w = QueryWindow {
            start: Some(utc(1_000)),
            end: Some(utc(2_000)),
        };
        assert!(w.overlaps(utc(500), utc(1_000)));
        assert!(w.overlaps(utc(1_500), utc(3_000)));
        assert!(!w.overlaps(utc(100), utc(999)));
        assert!(!w.overlaps(utc(2_001), utc(3_000)));
        assert!(QueryWindow::UNBOUNDED.overlaps(utc(0), utc(1)));
    }

    #[test]
    fn test_workout_without_routes_omits_key() {
        let rec = WorkoutRecord {
            uuid: "A".into(),
            start_date: "s".into(),
            end_date: "e".into(),
            workout_activity_type: ActivityType::Running,
            total_distance: 0.0,
            duration: 60.0,
            routes: None,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("routes").is_none());
        assert_eq!(json["workoutActivityType"], "running");
        assert_eq!(json["totalDistance"], 0.0);
        assert_eq!(rec.location_count(), 0);
    }
}
