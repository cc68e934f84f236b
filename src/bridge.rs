//! Caller-facing surface: `requestPermissions` and `getWorkouts`, plus the
//! JSON dispatch the JS side forwards through.

use crate::engine::QueryEngine;
use crate::error::{HealthError, Rejection, Result};
use crate::store::{Capabilities, HealthStore};
use crate::translate::DateFormatter;
use crate::types::{QueryWindow, WorkoutQuery, WorkoutRecord};
use once_cell::sync::OnceCell;
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub struct HealthBridge<S> {
    store: Arc<S>,
    capabilities: Capabilities,
    formatter: DateFormatter,
    engine: OnceCell<QueryEngine<S>>,
}

impl<S: HealthStore> HealthBridge<S> {
    pub fn new(store: S, capabilities: Capabilities, formatter: DateFormatter) -> Self {
        Self::from_shared(Arc::new(store), capabilities, formatter)
    }

    pub fn from_shared(store: Arc<S>, capabilities: Capabilities, formatter: DateFormatter) -> Self {
        Self {
            store,
            capabilities,
            formatter,
            engine: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    /// Run the store's consent step. On success the bridge is ready for
    /// [`Self::get_workouts`]; the returned flag is what the store reported.
    pub async fn request_permissions(&self) -> Result<bool> {
        if !self.store.is_health_data_available() {
            return Err(HealthError::DataUnavailable);
        }

        let kinds = self.capabilities.read_kinds();
        let granted = self
            .store
            .request_authorization(&kinds)
            .await
            .map_err(|e| HealthError::AuthorizationFailed(e.to_string()))?;

        self.engine.get_or_init(|| {
            QueryEngine::new(Arc::clone(&self.store), self.capabilities, self.formatter)
        });
        tracing::info!(granted, kinds = ?kinds, "authorization completed");
        Ok(granted)
    }

    pub async fn get_workouts(&self, query: WorkoutQuery) -> Result<Vec<WorkoutRecord>> {
        let engine = self.engine.get().ok_or(HealthError::NotInitialized)?;
        let window = QueryWindow::try_from(query)?;
        engine.fetch_workouts(&window).await
    }

    /// Dispatch a call by method name with JSON arguments, the way a
    /// promise-based native module is invoked.
    pub async fn invoke(
        &self,
        method: &str,
        args: JsonValue,
    ) -> std::result::Result<JsonValue, Rejection> {
        let result = match method {
            "requestPermissions" => self.request_permissions().await.map(JsonValue::Bool),
            "getWorkouts" => {
                let query = decode_query(args)?;
                self.get_workouts(query).await.and_then(|records| {
                    serde_json::to_value(records)
                        .map_err(|e| HealthError::query_failed(format!("encoding result: {e}")))
                })
            }
            other => Err(HealthError::invalid_argument(format!("unknown method {other:?}"))),
        };

        result.map_err(|e| {
            tracing::debug!(method, code = e.code(), error = %e, "bridge call rejected");
            Rejection::from(e)
        })
    }
}

fn decode_query(args: JsonValue) -> std::result::Result<WorkoutQuery, Rejection> {
    if args.is_null() {
        return Ok(WorkoutQuery::default());
    }
    serde_json::from_value(args)
        .map_err(|e| Rejection::from(HealthError::invalid_argument(format!("getWorkouts input: {e}"))))
}
