use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use common::{
    error::AppError,
    storage::types::{test_case::TestCase, test_session::TestSession},
};
use serde::Deserialize;
use tracing::info;

use common::utils::validation;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateTestCaseRequest {
    pub name: String,
    #[serde(default)]
    pub persona_name: Option<String>,
    /// Left empty, a random persona from the library is used at run time.
    #[serde(default)]
    pub persona_prompt: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub agent_speaks_first: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTestCaseRequest {
    pub name: Option<String>,
    pub persona_name: Option<String>,
    pub persona_prompt: Option<String>,
    pub scenario: Option<String>,
    pub goal: Option<String>,
    pub expected_outcome: Option<String>,
    pub max_turns: Option<u32>,
    pub agent_speaks_first: Option<bool>,
}

pub async fn list_test_cases(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TestSession::get(&session_id, &state.db).await?;
    let cases = TestCase::list_for_session(&session_id, &state.db).await?;
    Ok(Json(cases))
}

pub async fn create_test_case(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(input): Json<CreateTestCaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = TestSession::get(&session_id, &state.db).await?;

    let mut case = TestCase::new(
        session.id,
        validation::required_text("name", &input.name)?,
        input.persona_prompt.trim().to_string(),
    );
    if let Some(persona_name) = validation::optional_text(input.persona_name) {
        case.persona_name = persona_name;
    }
    case.scenario = input.scenario.trim().to_string();
    case.goal = validation::optional_text(input.goal);
    case.expected_outcome = input.expected_outcome.trim().to_string();
    case.max_turns = input.max_turns.map(validation::max_turns).transpose()?;
    if let Some(first) = input.agent_speaks_first {
        case.agent_speaks_first = first;
    }

    state
        .db
        .store_item(case.clone())
        .await
        .map_err(AppError::from)?;
    info!(test_case_id = %case.id, session_id, "Created test case");

    Ok((StatusCode::CREATED, Json(case)))
}

pub async fn get_test_case(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(TestCase::get(&id, &state.db).await?))
}

pub async fn update_test_case(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateTestCaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut case = TestCase::get(&id, &state.db).await?;

    if let Some(name) = input.name {
        case.name = validation::required_text("name", &name)?;
    }
    if let Some(persona_name) = input.persona_name {
        case.persona_name = validation::required_text("persona_name", &persona_name)?;
    }
    if let Some(prompt) = input.persona_prompt {
        case.persona_prompt = prompt.trim().to_string();
    }
    if let Some(scenario) = input.scenario {
        case.scenario = scenario.trim().to_string();
    }
    if input.goal.is_some() {
        case.goal = validation::optional_text(input.goal);
    }
    if let Some(expected) = input.expected_outcome {
        case.expected_outcome = expected.trim().to_string();
    }
    if let Some(max_turns) = input.max_turns {
        case.max_turns = Some(validation::max_turns(max_turns)?);
    }
    if let Some(first) = input.agent_speaks_first {
        case.agent_speaks_first = first;
    }
    case.updated_at = Utc::now();

    state
        .db
        .update_item(case.clone())
        .await
        .map_err(AppError::from)?;

    Ok(Json(case))
}

pub async fn delete_test_case(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TestCase::get(&id, &state.db).await?;
    state
        .db
        .delete_item::<TestCase>(&id)
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
