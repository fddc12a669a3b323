use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::{
    conversation::{Conversation, ConversationStatus},
    conversation_turn::ConversationTurn,
    evaluation::Evaluation,
    test_session::TestSession,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use simulation::{import_transcripts, transcript::BotTranscript};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError, routes::optional_json};

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub bot1: BotTranscript,
    pub bot2: BotTranscript,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub turns: Vec<ConversationTurn>,
    pub latest_evaluation: Option<Evaluation>,
    pub running: bool,
}

pub async fn list_conversations(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    TestSession::get(&session_id, &state.db).await?;
    let conversations = Conversation::list_for_session(&session_id, &state.db).await?;
    Ok(Json(conversations))
}

pub async fn simulate(
    State(state): State<ApiState>,
    Path(test_case_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let input: SimulateRequest = optional_json(&body)?;
    let handle = state.simulations.start(&test_case_id, input.model).await?;
    Ok((StatusCode::ACCEPTED, Json(handle.conversation)))
}

pub async fn import_conversation(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(input): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, turns) =
        import_transcripts(&state.db, &session_id, &input.bot1, &input.bot2).await?;
    Ok((
        StatusCode::CREATED,
        Json(ConversationDetail {
            conversation,
            turns,
            latest_evaluation: None,
            running: false,
        }),
    ))
}

pub async fn get_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (conversation, turns) = Conversation::get_with_turns(&id, &state.db).await?;
    let latest_evaluation = Evaluation::latest_for_conversation(&id, &state.db).await?;
    let running = state.simulations.registry().is_running(&id);

    Ok(Json(ConversationDetail {
        conversation,
        turns,
        latest_evaluation,
        running,
    }))
}

pub async fn delete_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Conversation::get(&id, &state.db).await?;
    state.simulations.stop_and_wait(&id).await;
    Conversation::delete_with_children(&id, &state.db).await?;
    info!(conversation_id = %id, "Deleted conversation");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_conversation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = Conversation::get(&id, &state.db).await?;
    if conversation.status != ConversationStatus::Running || !state.simulations.stop(&id) {
        return Err(ApiError::Conflict(format!(
            "Conversation {id} is not running"
        )));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "stopping", "conversation_id": id })),
    ))
}
