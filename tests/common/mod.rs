//! Shared fixtures for the integration tests: an in-memory store whose
//! location batches are delivered from plain OS threads, with per-route
//! delays so routes finish out of order.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use healthbridge::StoreError;
use healthbridge::store::{HealthStore, LocationStream, location_channel};
use healthbridge::types::{
    LocationBatch, NativeLocation, NativeRoute, NativeSample, NativeWorkout, QueryWindow,
    SampleKind,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

pub struct ScriptedRoute {
    pub route: NativeRoute,
    /// Locations per batch; the last batch is flagged done.
    pub batches: Vec<usize>,
    /// Delay before each batch.
    pub delay: Duration,
}

pub struct ScriptedWorkout {
    pub sample: NativeWorkout,
    pub routes: Vec<ScriptedRoute>,
}

#[derive(Default)]
pub struct ScriptedStore {
    pub workouts: Vec<ScriptedWorkout>,
    pub fail_workout_query: Option<String>,
    pub workout_queries: AtomicUsize,
    pub route_queries: AtomicUsize,
    pub location_queries: AtomicUsize,
    pub last_window: Mutex<Option<QueryWindow>>,
}

impl ScriptedStore {
    pub fn new(workouts: Vec<ScriptedWorkout>) -> Self {
        Self {
            workouts,
            ..Self::default()
        }
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.workout_queries.load(Ordering::SeqCst),
            self.route_queries.load(Ordering::SeqCst),
            self.location_queries.load(Ordering::SeqCst),
        )
    }

    fn find_route(&self, uuid: Uuid) -> Option<&ScriptedRoute> {
        self.workouts
            .iter()
            .flat_map(|w| &w.routes)
            .find(|r| r.route.uuid == uuid)
    }
}

pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// 2018-01-01T00:00:00Z
pub const JAN_2018: i64 = 1_514_764_800_000;

pub fn workout(n: u128, activity_code: u32, start_ms: i64, routes: Vec<ScriptedRoute>) -> ScriptedWorkout {
    ScriptedWorkout {
        sample: NativeWorkout {
            uuid: Uuid::from_u128(n),
            activity_code,
            start: at(start_ms),
            end: at(start_ms + 1_800_000),
            total_distance_m: Some(5_000.0 + n as f64),
            duration_s: 1_800.0,
        },
        routes,
    }
}

pub fn route(n: u128, start_ms: i64, batches: Vec<usize>, delay_ms: u64) -> ScriptedRoute {
    ScriptedRoute {
        route: NativeRoute {
            uuid: Uuid::from_u128(n),
            start: at(start_ms),
            end: at(start_ms + 1_800_000),
        },
        batches,
        delay: Duration::from_millis(delay_ms),
    }
}

/// Location `seq` of a route starting at `start`: one fix per second.
pub fn location(start: DateTime<Utc>, seq: usize) -> NativeLocation {
    NativeLocation {
        latitude: 48.0 + seq as f64 * 1e-4,
        longitude: -4.0,
        timestamp: start + chrono::Duration::seconds(seq as i64),
        horizontal_accuracy: 5.0,
        vertical_accuracy: 3.0,
        speed: 2.5,
        course: 180.0,
        altitude: 20.0,
        floor: None,
    }
}

#[async_trait]
impl HealthStore for ScriptedStore {
    fn is_health_data_available(&self) -> bool {
        true
    }

    async fn request_authorization(&self, _read: &[SampleKind]) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn query_workouts(&self, window: &QueryWindow) -> Result<Vec<NativeSample>, StoreError> {
        self.workout_queries.fetch_add(1, Ordering::SeqCst);
        *self.last_window.lock().unwrap() = Some(*window);
        if let Some(msg) = &self.fail_workout_query {
            return Err(StoreError::other(msg.clone()));
        }
        Ok(self
            .workouts
            .iter()
            .filter(|w| window.overlaps(w.sample.start, w.sample.end))
            .map(|w| NativeSample::Workout(w.sample.clone()))
            .collect())
    }

    async fn query_routes(&self, workout: &NativeWorkout) -> Result<Vec<NativeRoute>, StoreError> {
        self.route_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .workouts
            .iter()
            .find(|w| w.sample.uuid == workout.uuid)
            .map(|w| w.routes.iter().map(|r| r.route.clone()).collect())
            .unwrap_or_default())
    }

    fn route_locations(&self, route: &NativeRoute) -> LocationStream {
        self.location_queries.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = location_channel();
        let Some(scripted) = self.find_route(route.uuid) else {
            tx.send(Err(StoreError::not_found(route.uuid.to_string()))).unwrap();
            return rx;
        };

        let start = scripted.route.start;
        let batches = scripted.batches.clone();
        let delay = scripted.delay;
        thread::spawn(move || {
            let mut seq = 0;
            let last = batches.len().saturating_sub(1);
            for (i, n) in batches.into_iter().enumerate() {
                thread::sleep(delay);
                let locations = (seq..seq + n).map(|s| location(start, s)).collect();
                seq += n;
                if tx
                    .send(Ok(LocationBatch {
                        locations,
                        done: i == last,
                    }))
                    .is_err()
                {
                    return;
                }
            }
        });
        rx
    }
}
