use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use common::storage::types::{
    conversation::{Conversation, LatencySummary},
    conversation_turn::{ConversationTurn, Speaker},
    evaluation::{Evaluation, EvaluationSummary},
    score::{Score, ScoreValue},
};
use evaluations::service::{evaluate_stored_conversation, EvaluationOptions};
use serde::Serialize;
use tracing::info;

use crate::{
    html_state::HtmlState,
    middlewares::response_middleware::{HtmlError, TemplateResponse},
};

#[derive(Serialize)]
pub struct TurnItem {
    turn_index: u32,
    is_agent: bool,
    speaker_name: String,
    content: String,
    latency_ms: u64,
}

impl From<&ConversationTurn> for TurnItem {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            turn_index: turn.turn_index,
            is_agent: turn.speaker == Speaker::Agent,
            speaker_name: turn.speaker_name.clone(),
            content: turn.content.clone(),
            latency_ms: turn.latency_ms,
        }
    }
}

#[derive(Serialize)]
pub struct ScoreItem {
    metric_name: String,
    scoring_type: String,
    weight: f64,
    value: Option<f64>,
    passed: Option<bool>,
    reasoning: String,
    evaluation_steps: Vec<String>,
}

impl From<&Score> for ScoreItem {
    fn from(score: &Score) -> Self {
        let (value, passed) = match score.value {
            ScoreValue::Scale(value) => (Some(value), None),
            ScoreValue::Boolean(passed) => (None, Some(passed)),
            ScoreValue::Unparsed => (None, None),
        };
        Self {
            metric_name: score.metric_name.clone(),
            scoring_type: score.scoring_type.to_string(),
            weight: score.weight,
            value,
            passed,
            reasoning: score.reasoning.clone(),
            evaluation_steps: score.evaluation_steps.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct TranscriptData {
    conversation_id: String,
    status: String,
    end_reason: Option<String>,
    goal_reasoning: Option<String>,
    running: bool,
    turns: Vec<TurnItem>,
    latency: Option<LatencySummary>,
}

#[derive(Serialize)]
pub struct ConversationPageData {
    session_id: String,
    agent_name: String,
    persona_name: String,
    source: String,
    created_at: String,
    transcript: TranscriptData,
    evaluation: Option<EvaluationSummary>,
    evaluation_model: Option<String>,
    scores: Vec<ScoreItem>,
}

async fn load_transcript(
    state: &HtmlState,
    id: &str,
) -> Result<(Conversation, TranscriptData), HtmlError> {
    let (conversation, turns) = Conversation::get_with_turns(id, &state.db).await?;
    let transcript = TranscriptData {
        conversation_id: conversation.id.clone(),
        status: format!("{:?}", conversation.status).to_lowercase(),
        end_reason: conversation.end_reason.map(|r| format!("{r:?}")),
        goal_reasoning: conversation.goal_reasoning.clone(),
        running: state.simulations.registry().is_running(id),
        turns: turns.iter().map(TurnItem::from).collect(),
        latency: conversation.metrics.clone(),
    };
    Ok((conversation, transcript))
}

pub async fn show_conversation(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let (conversation, transcript) = load_transcript(&state, &id).await?;

    let latest = Evaluation::latest_for_conversation(&id, &state.db).await?;
    let scores = match &latest {
        Some(evaluation) => Score::list_for_conversation(&id, &state.db)
            .await?
            .iter()
            .filter(|score| score.evaluation_id == evaluation.id)
            .map(ScoreItem::from)
            .collect(),
        None => Vec::new(),
    };

    Ok(TemplateResponse::new_template(
        "conversations/detail.html",
        ConversationPageData {
            session_id: conversation.session_id.clone(),
            agent_name: conversation.agent_name.clone(),
            persona_name: conversation.persona_name.clone(),
            source: format!("{:?}", conversation.source).to_lowercase(),
            created_at: conversation.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            transcript,
            evaluation_model: latest.as_ref().map(|e| e.model.clone()),
            evaluation: latest.map(|e| e.summary),
            scores,
        },
    ))
}

/// Polled by the page while a simulation is still producing turns.
pub async fn show_transcript(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let (_, transcript) = load_transcript(&state, &id).await?;

    #[derive(Serialize)]
    struct TranscriptBlock {
        transcript: TranscriptData,
    }

    Ok(TemplateResponse::new_partial(
        "conversations/detail.html",
        "transcript",
        TranscriptBlock { transcript },
    ))
}

pub async fn start_simulation(
    State(state): State<HtmlState>,
    Path(test_case_id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let handle = state.simulations.start(&test_case_id, None).await?;
    info!(conversation_id = %handle.conversation.id, %test_case_id, "Simulation started from UI");
    Ok(TemplateResponse::redirect(format!(
        "/conversations/{}",
        handle.conversation.id
    )))
}

pub async fn stop_conversation(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    Conversation::get(&id, &state.db).await?;
    state.simulations.stop(&id);
    Ok(TemplateResponse::redirect(format!("/conversations/{id}")))
}

pub async fn evaluate_conversation(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let options = EvaluationOptions {
        model: state.judge_model(),
        ..EvaluationOptions::default()
    };
    evaluate_stored_conversation(&state.db, state.language_model.clone(), &id, options).await?;
    Ok(TemplateResponse::redirect(format!("/conversations/{id}")))
}

pub async fn delete_conversation(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let conversation = Conversation::get(&id, &state.db).await?;
    state.simulations.stop_and_wait(&id).await;
    Conversation::delete_with_children(&id, &state.db).await?;
    info!(conversation_id = %id, "Deleted conversation from UI");
    Ok(TemplateResponse::redirect(format!(
        "/sessions/{}",
        conversation.session_id
    )))
}
