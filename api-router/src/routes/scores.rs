use axum::{
    body::Bytes,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use common::storage::types::{
    conversation::Conversation,
    evaluation::Evaluation,
    score::{MetricAggregate, Score},
    test_session::TestSession,
};
use evaluations::service::{evaluate_stored_conversation, EvaluationOptions};
use serde::Serialize;

use crate::{api_state::ApiState, error::ApiError, routes::optional_json};

#[derive(Debug, Serialize)]
pub struct ConversationScores {
    pub evaluations: Vec<Evaluation>,
    pub scores: Vec<Score>,
}

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub evaluation: Evaluation,
    pub scores: Vec<Score>,
}

#[derive(Debug, Serialize)]
pub struct SessionScores {
    pub session_id: String,
    pub conversations_scored: usize,
    pub metrics: Vec<MetricAggregate>,
}

pub async fn evaluate_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mut options: EvaluationOptions = optional_json(&body)?;
    options.model = state.judge_model(options.model);

    let (evaluation, scores) =
        evaluate_stored_conversation(&state.db, state.language_model.clone(), &id, options)
            .await?;

    Ok(Json(EvaluationResponse { evaluation, scores }))
}

pub async fn conversation_scores(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Conversation::get(&id, &state.db).await?;
    let evaluations = Evaluation::list_for_conversation(&id, &state.db).await?;
    let scores = Score::list_for_conversation(&id, &state.db).await?;
    Ok(Json(ConversationScores {
        evaluations,
        scores,
    }))
}

pub async fn session_scores(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TestSession::get(&session_id, &state.db).await?;
    let scores = Score::list_for_session(&session_id, &state.db).await?;

    let mut conversation_ids: Vec<&str> = scores.iter().map(|s| s.conversation_id.as_str()).collect();
    conversation_ids.sort_unstable();
    conversation_ids.dedup();

    Ok(Json(SessionScores {
        conversations_scored: conversation_ids.len(),
        metrics: Score::aggregate_by_metric(&scores),
        session_id,
    }))
}
