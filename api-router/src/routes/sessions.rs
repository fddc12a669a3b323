use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use common::{
    error::AppError,
    storage::types::{
        conversation::Conversation,
        scoring_metric::ScoringMetric,
        test_case::TestCase,
        test_session::{TestSession, DEFAULT_MAX_TURNS},
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;

use common::utils::validation;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agent_name: String,
    pub agent_prompt: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub allow_interruptions: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub agent_name: Option<String>,
    pub agent_prompt: Option<String>,
    /// An empty string clears the goal.
    pub goal: Option<String>,
    pub max_turns: Option<u32>,
    pub allow_interruptions: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session: TestSession,
    pub test_cases: Vec<TestCase>,
    pub metrics: Vec<ScoringMetric>,
    pub conversations: Vec<Conversation>,
}

pub async fn list_sessions(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let sessions = TestSession::list_newest_first(&state.db).await?;
    Ok(Json(sessions))
}

pub async fn create_session(
    State(state): State<ApiState>,
    Json(input): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = TestSession::new(
        validation::required_text("name", &input.name)?,
        validation::required_text("agent_name", &input.agent_name)?,
        validation::required_text("agent_prompt", &input.agent_prompt)?,
    );
    session.description = input.description.trim().to_string();
    session.goal = validation::optional_text(input.goal);
    session.max_turns = validation::max_turns(input.max_turns.unwrap_or(DEFAULT_MAX_TURNS))?;
    session.allow_interruptions = input.allow_interruptions;

    state.db.store_item(session.clone()).await.map_err(AppError::from)?;
    info!(session_id = %session.id, "Created test session");

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = TestSession::get(&id, &state.db).await?;
    let test_cases = TestCase::list_for_session(&id, &state.db).await?;
    let metrics = ScoringMetric::list_for_session(&id, &state.db).await?;
    let conversations = Conversation::list_for_session(&id, &state.db).await?;

    Ok(Json(SessionDetail {
        session,
        test_cases,
        metrics,
        conversations,
    }))
}

pub async fn update_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut session = TestSession::get(&id, &state.db).await?;

    if let Some(name) = input.name {
        session.name = validation::required_text("name", &name)?;
    }
    if let Some(description) = input.description {
        session.description = description.trim().to_string();
    }
    if let Some(agent_name) = input.agent_name {
        session.agent_name = validation::required_text("agent_name", &agent_name)?;
    }
    if let Some(agent_prompt) = input.agent_prompt {
        session.agent_prompt = validation::required_text("agent_prompt", &agent_prompt)?;
    }
    if input.goal.is_some() {
        session.goal = validation::optional_text(input.goal);
    }
    if let Some(max_turns) = input.max_turns {
        session.max_turns = validation::max_turns(max_turns)?;
    }
    if let Some(allow) = input.allow_interruptions {
        session.allow_interruptions = allow;
    }
    session.updated_at = Utc::now();

    state
        .db
        .update_item(session.clone())
        .await
        .map_err(AppError::from)?;

    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    for conversation in Conversation::list_for_session(&id, &state.db).await? {
        state.simulations.stop_and_wait(&conversation.id).await;
    }
    TestSession::delete_cascade(&id, &state.db).await?;
    info!(session_id = %id, "Deleted test session");
    Ok(StatusCode::NO_CONTENT)
}
