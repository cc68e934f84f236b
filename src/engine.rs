//! Workout → route → location aggregation.
//!
//! Workout-level failures abort the whole query. Route- and location-level
//! failures only trim that subtree: a workout whose routes cannot be read is
//! returned without a `routes` key, a route whose location stream fails keeps
//! the locations delivered so far.

use crate::dlog;
use crate::error::{HealthError, Result};
use crate::fan_in::FanIn;
use crate::store::{Capabilities, HealthStore};
use crate::translate::{self, DateFormatter};
use crate::types::{
    LocationRecord, NativeRoute, NativeSample, NativeWorkout, QueryWindow, RouteRecord,
    WorkoutRecord,
};
use std::sync::Arc;

struct Inner<S> {
    store: Arc<S>,
    capabilities: Capabilities,
    formatter: DateFormatter,
}

/// Runs `fetch_workouts` against one store. Cheap to clone.
pub struct QueryEngine<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for QueryEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: HealthStore> QueryEngine<S> {
    pub fn new(store: Arc<S>, capabilities: Capabilities, formatter: DateFormatter) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                capabilities,
                formatter,
            }),
        }
    }

    /// All workouts in `window`, each with its routes and their locations
    /// attached, in the order the store returned them.
    pub async fn fetch_workouts(&self, window: &QueryWindow) -> Result<Vec<WorkoutRecord>> {
        if window.is_inverted() {
            tracing::warn!(
                start = ?window.start,
                end = ?window.end,
                "query window starts after it ends; nothing can match"
            );
            return Ok(Vec::new());
        }

        let samples = self
            .inner
            .store
            .query_workouts(window)
            .await
            .map_err(|e| HealthError::query_failed(e.to_string()))?;

        let workouts = samples
            .into_iter()
            .map(|sample| match sample {
                NativeSample::Workout(w) => Ok(w),
                NativeSample::Other { type_name } => Err(HealthError::UnexpectedResultShape(
                    format!("expected workout samples, got {type_name}"),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        if workouts.is_empty() {
            dlog!("no workouts in window start={:?} end={:?}", window.start, window.end);
            return Ok(Vec::new());
        }

        let total = workouts.len();
        let (fan_in, completer) = FanIn::new(total);
        for (slot, workout) in workouts.into_iter().enumerate() {
            let inner = Arc::clone(&self.inner);
            let completer = completer.clone();
            tokio::spawn(async move {
                let record = assemble_workout(&inner, workout).await;
                completer.complete(slot, record);
            });
        }
        drop(completer);

        let records = fan_in
            .wait()
            .await
            .map_err(|e| HealthError::query_failed(e.to_string()))?;

        tracing::info!(
            workouts = records.len(),
            with_routes = records.iter().filter(|w| w.routes.is_some()).count(),
            locations = records.iter().map(WorkoutRecord::location_count).sum::<usize>(),
            "workout query finished"
        );
        Ok(records)
    }
}

async fn assemble_workout<S: HealthStore>(inner: &Arc<Inner<S>>, workout: NativeWorkout) -> WorkoutRecord {
    let mut record = translate::workout(&workout, &inner.formatter);
    if inner.capabilities.route_queries {
        record.routes = collect_routes(inner, &workout).await;
    }
    record
}

/// `None` when there is nothing to attach: no routes, or they could not be read.
async fn collect_routes<S: HealthStore>(
    inner: &Arc<Inner<S>>,
    workout: &NativeWorkout,
) -> Option<Vec<RouteRecord>> {
    let routes = match inner.store.query_routes(workout).await {
        Ok(routes) => routes,
        Err(e) => {
            tracing::warn!(workout = %workout.uuid, error = %e, "route query failed; skipping routes");
            return None;
        }
    };
    if routes.is_empty() {
        return None;
    }

    let (fan_in, completer) = FanIn::new(routes.len());
    for (slot, route) in routes.into_iter().enumerate() {
        let inner = Arc::clone(inner);
        let completer = completer.clone();
        tokio::spawn(async move {
            let mut record = translate::route(&route, &inner.formatter);
            record.locations = collect_locations(&inner, &route).await;
            completer.complete(slot, record);
        });
    }
    drop(completer);

    match fan_in.wait().await {
        Ok(records) => Some(records),
        Err(e) => {
            tracing::warn!(workout = %workout.uuid, error = %e, "route collection abandoned");
            None
        }
    }
}

async fn collect_locations<S: HealthStore>(inner: &Inner<S>, route: &NativeRoute) -> Vec<LocationRecord> {
    let mut stream = inner.store.route_locations(route);
    let mut out = Vec::new();
    let mut batches = 0usize;

    while let Some(item) = stream.recv().await {
        match item {
            Ok(batch) => {
                batches += 1;
                out.extend(
                    batch
                        .locations
                        .iter()
                        .map(|l| translate::location(l, &inner.formatter)),
                );
                if batch.done {
                    dlog!("route={} batches={batches} locations={}", route.uuid, out.len());
                    return out;
                }
            }
            Err(e) => {
                tracing::warn!(
                    route = %route.uuid,
                    error = %e,
                    kept = out.len(),
                    "location query failed; keeping locations delivered so far"
                );
                return out;
            }
        }
    }

    tracing::warn!(
        route = %route.uuid,
        kept = out.len(),
        "location stream closed before completion"
    );
    out
}
