//! HTTP endpoint for the initial aggregate fetch.
//!
//! Dashboards load the current aggregate once over REST, render it, then
//! subscribe to the WebSocket stream for live refreshes. Both paths run
//! the same computation through the same port.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::domain::{AggregateUpdate, PartitionKey};
use crate::ports::{AggregateSource, ComputeError};

/// State for the aggregate endpoints.
#[derive(Clone)]
pub struct AggregateApiState {
    /// Same source the coordinator computes through.
    pub source: Arc<dyn AggregateSource>,
}

impl AggregateApiState {
    /// Create a new API state.
    pub fn new(source: Arc<dyn AggregateSource>) -> Self {
        Self { source }
    }
}

/// Error body returned by aggregate endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Aggregate API error that implements IntoResponse.
#[derive(Debug)]
pub enum AggregateApiError {
    Unavailable(String),
    Timeout,
}

impl IntoResponse for AggregateApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            AggregateApiError::Unavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    code: "DATA_UNAVAILABLE".to_string(),
                    message,
                },
            ),
            AggregateApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody {
                    code: "COMPUTE_TIMEOUT".to_string(),
                    message: "Aggregate computation exceeded its deadline".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ComputeError> for AggregateApiError {
    fn from(error: ComputeError) -> Self {
        match error {
            ComputeError::DataUnavailable(message) => AggregateApiError::Unavailable(message),
            ComputeError::Timeout => AggregateApiError::Timeout,
        }
    }
}

/// GET /api/aggregate/:partition
///
/// Computes and returns the current aggregate for one partition.
pub async fn get_aggregate(
    State(state): State<AggregateApiState>,
    Path(partition): Path<String>,
) -> Result<Json<AggregateUpdate>, AggregateApiError> {
    let key = PartitionKey::new(partition);
    let rows = state.source.compute(&key).await?;
    Ok(Json(AggregateUpdate::new(key, rows)))
}

/// Creates the aggregate router with all routes.
pub fn aggregate_router(state: AggregateApiState) -> Router {
    Router::new()
        // GET /aggregate/:partition
        .route("/aggregate/:partition", get(get_aggregate))
        .with_state(state)
}
