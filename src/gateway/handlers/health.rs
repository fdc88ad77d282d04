//! Health check handler

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use utoipa::ToSchema;

use super::super::state::AppState;
use super::super::types::{ApiResponse, error_codes};

/// Health check response data
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct HealthResponse {
    /// Storage back end in use
    #[schema(example = "postgres")]
    pub storage: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Build commit
    #[schema(example = "a1b2c3d")]
    pub git_hash: String,
    pub uptime_secs: u64,
}

/// Health check endpoint
///
/// Probes the storage back end. Internal failure details are logged, not returned.
///
/// - Healthy: 200 OK + {code: 0, data: {...}}
/// - Unhealthy: 503 Service Unavailable + {code: 5001, msg: "unavailable"}
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Service unavailable")
    ),
    tag = "System"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let store = state.store();
    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(HealthResponse {
                storage: store.name().to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                git_hash: env!("GIT_HASH").to_string(),
                uptime_secs: state.uptime_secs(),
            })),
        ),
        Err(e) => {
            tracing::error!(storage = store.name(), "[HEALTH] storage probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    code: error_codes::SERVICE_UNAVAILABLE,
                    msg: "unavailable".to_string(),
                    data: None,
                }),
            )
        }
    }
}
