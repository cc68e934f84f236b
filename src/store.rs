//! The seam between the aggregation engine and a concrete health-data store.

use crate::error::StoreError;
use crate::types::{LocationBatch, NativeRoute, NativeSample, NativeWorkout, QueryWindow, SampleKind};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receiving half of a route-location query. Items arrive in the order the
/// store sends them, from whatever thread it sends them on.
pub type LocationStream = mpsc::UnboundedReceiver<Result<LocationBatch, StoreError>>;
pub type LocationSink = mpsc::UnboundedSender<Result<LocationBatch, StoreError>>;

pub fn location_channel() -> (LocationSink, LocationStream) {
    mpsc::unbounded_channel()
}

/// What the platform can do, decided at construction rather than by version checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub route_queries: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            route_queries: true,
        }
    }
}

impl Capabilities {
    pub const WORKOUTS_ONLY: Self = Self {
        route_queries: false,
    };

    /// Sample types a permission request asks read access for.
    pub fn read_kinds(&self) -> Vec<SampleKind> {
        let mut kinds = vec![SampleKind::Workout];
        if self.route_queries {
            kinds.push(SampleKind::WorkoutRoute);
        }
        kinds
    }
}

/// A read-only health-data store.
///
/// Implementations are shared behind an `Arc` and called from many tasks at once.
#[async_trait]
pub trait HealthStore: Send + Sync + 'static {
    /// Whether the platform has a health-data store at all.
    fn is_health_data_available(&self) -> bool;

    /// Ask for read access. `Ok(granted)` when the consent step completed.
    async fn request_authorization(&self, read: &[SampleKind]) -> Result<bool, StoreError>;

    /// Samples of the workout type inside `window`, unsorted and unlimited.
    async fn query_workouts(&self, window: &QueryWindow) -> Result<Vec<NativeSample>, StoreError>;

    async fn query_routes(&self, workout: &NativeWorkout) -> Result<Vec<NativeRoute>, StoreError>;

    /// Start a location query. Batches flow through the returned stream until
    /// one is flagged `done`, an error is sent, or the sender is dropped.
    fn route_locations(&self, route: &NativeRoute) -> LocationStream;
}
