use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use common::{
    error::AppError,
    storage::types::{score::ScoringType, scoring_metric::ScoringMetric, test_session::TestSession},
};
use serde::Deserialize;
use tracing::info;

use common::utils::validation;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateMetricRequest {
    pub name: String,
    pub description: String,
    /// `scale` or `boolean`.
    pub scoring_type: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMetricRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub scoring_type: Option<String>,
    pub instructions: Option<String>,
    pub weight: Option<f64>,
}

pub async fn list_metrics(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TestSession::get(&session_id, &state.db).await?;
    let metrics = ScoringMetric::list_for_session(&session_id, &state.db).await?;
    Ok(Json(metrics))
}

pub async fn create_metric(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(input): Json<CreateMetricRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = TestSession::get(&session_id, &state.db).await?;
    let scoring_type: ScoringType = input.scoring_type.parse()?;

    let mut metric = ScoringMetric::new(
        session.id,
        validation::required_text("name", &input.name)?,
        validation::required_text("description", &input.description)?,
        scoring_type,
    );
    metric.instructions = input.instructions.trim().to_string();
    metric.weight = validation::weight(input.weight.unwrap_or(1.0))?;

    state
        .db
        .store_item(metric.clone())
        .await
        .map_err(AppError::from)?;
    info!(metric_id = %metric.id, session_id, %scoring_type, "Created scoring metric");

    Ok((StatusCode::CREATED, Json(metric)))
}

pub async fn get_metric(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(ScoringMetric::get(&id, &state.db).await?))
}

pub async fn update_metric(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateMetricRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut metric = ScoringMetric::get(&id, &state.db).await?;

    if let Some(name) = input.name {
        metric.name = validation::required_text("name", &name)?;
    }
    if let Some(description) = input.description {
        metric.description = validation::required_text("description", &description)?;
    }
    if let Some(scoring_type) = input.scoring_type {
        metric.scoring_type = scoring_type.parse()?;
    }
    if let Some(instructions) = input.instructions {
        metric.instructions = instructions.trim().to_string();
    }
    if let Some(weight) = input.weight {
        metric.weight = validation::weight(weight)?;
    }
    metric.updated_at = Utc::now();

    state
        .db
        .update_item(metric.clone())
        .await
        .map_err(AppError::from)?;

    Ok(Json(metric))
}

pub async fn delete_metric(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    ScoringMetric::get(&id, &state.db).await?;
    state
        .db
        .delete_item::<ScoringMetric>(&id)
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
