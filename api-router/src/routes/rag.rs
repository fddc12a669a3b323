use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::rag_evaluation::RagEvaluation;
use evaluations::service::{evaluate_rag_answer, RagEvaluationInput};
use rag_pipeline::RagAnswer;
use serde::{Deserialize, Serialize};

use common::utils::validation;

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_EVALUATION_LIMIT: usize = 50;
const MAX_EVALUATION_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct RagQueryRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Score the answer with the RAGAS metrics right away.
    #[serde(default)]
    pub evaluate: bool,
    #[serde(default)]
    pub ground_truth: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RagQueryResponse {
    #[serde(flatten)]
    pub answer: RagAnswer,
    pub evaluation: Option<RagEvaluation>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluationListParams {
    pub limit: Option<usize>,
}

pub async fn query(
    State(state): State<ApiState>,
    Json(input): Json<RagQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = validation::required_text("question", &input.question)?;
    let top_k = validation::top_k(input.top_k, state.config.retrieval_top_k)?;

    let answer = state.documents.answer(&question, top_k).await?;

    let evaluation = if input.evaluate && !answer.contexts.is_empty() {
        let record = evaluate_rag_answer(
            &state.db,
            state.language_model.clone(),
            RagEvaluationInput {
                question: answer.question.clone(),
                answer: answer.answer.clone(),
                contexts: answer.contexts.iter().map(|c| c.text.clone()).collect(),
                ground_truth: validation::optional_text(input.ground_truth),
                model: state.judge_model(None),
            },
        )
        .await?;
        Some(record)
    } else {
        None
    };

    Ok(Json(RagQueryResponse { answer, evaluation }))
}

pub async fn evaluate(
    State(state): State<ApiState>,
    Json(mut input): Json<RagEvaluationInput>,
) -> Result<impl IntoResponse, ApiError> {
    input.model = state.judge_model(input.model);
    input.ground_truth = validation::optional_text(input.ground_truth);
    let record = evaluate_rag_answer(&state.db, state.language_model.clone(), input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_evaluations(
    State(state): State<ApiState>,
    Query(params): Query<EvaluationListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EVALUATION_LIMIT)
        .clamp(1, MAX_EVALUATION_LIMIT);
    let evaluations = RagEvaluation::list_newest_first(limit, &state.db).await?;
    Ok(Json(evaluations))
}
