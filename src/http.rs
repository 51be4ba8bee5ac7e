//! HTTP Interface
//!
//! TigerStyle: Thin axum surface over the lookup service.
//!
//! Routes:
//! - `GET /digit/:position` - digit plus rendered context window
//! - `GET /info` - available digit count and configured maximum
//! - `GET /health` - liveness check

use crate::lookup::{LookupError, LookupResult, LookupService};
use crate::source::DigitSource;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

// =============================================================================
// State
// =============================================================================

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    lookup: Arc<LookupService>,
}

impl AppState {
    /// Wrap a lookup service for the handlers
    pub fn new(lookup: LookupService) -> Self {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// The shared lookup service
    pub fn lookup(&self) -> &LookupService {
        &self.lookup
    }
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/digit/:position", get(digit))
        .route("/info", get(info))
        .route("/health", get(health))
        .with_state(state)
}

/// Resolve the digit source in the background after `delay`.
///
/// Failure is logged only; the next lookup retries.
pub fn spawn_preload(source: Arc<DigitSource>, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        match source.resolve().await {
            Ok(digits) => tracing::info!(digits = digits.len(), "preloaded digits"),
            Err(err) => tracing::warn!(error = %err, "preload failed"),
        }
    })
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Serialize)]
struct DigitResponse {
    #[serde(flatten)]
    result: LookupResult,
    context: String,
}

#[derive(Debug, Serialize)]
struct InfoResponse {
    available: Option<usize>,
    max: usize,
    resolved: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

/// GET /digit/:position
async fn digit(
    State(state): State<AppState>,
    Path(position): Path<String>,
) -> Result<Json<DigitResponse>, ApiError> {
    let result = state.lookup.lookup_input(&position).await?;
    let context = result.window.render();
    Ok(Json(DigitResponse { result, context }))
}

/// GET /info
async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let available = state.lookup.available();
    Json(InfoResponse {
        available,
        max: state.lookup.digits_count_max(),
        resolved: available.is_some(),
    })
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

// =============================================================================
// Errors
// =============================================================================

/// Lookup error rendered as a JSON response
#[derive(Debug)]
struct ApiError(LookupError);

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LookupError::InvalidPosition { .. } | LookupError::PositionTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            LookupError::PositionBeyondAvailableData { .. } => StatusCode::NOT_FOUND,
            LookupError::SourceUnavailable(source) => {
                tracing::warn!(error = %source, "lookup failed: digits unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = ErrorResponse {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
