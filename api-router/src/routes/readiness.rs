use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::api_state::ApiState;

/// 200 once the database answers a trivial query, 503 otherwise.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let running_simulations = state.simulations.registry().running_count();

    match state.db.client.query("RETURN true").await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok" },
                "running_simulations": running_simulations,
            })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "checks": { "db": "fail" },
                    "reason": e.to_string()
                })),
            )
        }
    }
}
