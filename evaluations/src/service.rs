use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            conversation::Conversation, evaluation::Evaluation, rag_evaluation::RagEvaluation,
            score::Score, scoring_metric::ScoringMetric,
        },
    },
    utils::llm::LanguageModel,
};
use serde::Deserialize;
use tracing::info;

use crate::{criteria::criteria_from_metrics, judge::LlmJudge, ragas::RagasEvaluator};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationOptions {
    /// Restricts scoring to these metrics of the conversation's session.
    #[serde(default)]
    pub metric_ids: Option<Vec<String>>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Judges a stored conversation against its session's metrics and persists
/// the evaluation with one score per criterion.
pub async fn evaluate_stored_conversation(
    db: &SurrealDbClient,
    language_model: Arc<dyn LanguageModel>,
    conversation_id: &str,
    options: EvaluationOptions,
) -> Result<(Evaluation, Vec<Score>), AppError> {
    let (conversation, turns) = Conversation::get_with_turns(conversation_id, db).await?;

    let mut metrics = ScoringMetric::list_for_session(&conversation.session_id, db).await?;
    if let Some(ids) = &options.metric_ids {
        if let Some(unknown) = ids.iter().find(|id| !metrics.iter().any(|m| &m.id == *id)) {
            return Err(AppError::Validation(format!(
                "Metric {unknown} does not belong to this session"
            )));
        }
        metrics.retain(|m| ids.contains(&m.id));
    }
    let criteria = criteria_from_metrics(&metrics)?;

    let judge = LlmJudge::new(language_model).with_model(options.model);
    let result = judge.evaluate_transcript(&turns, &criteria).await?;

    let evaluation = Evaluation::new(
        conversation.id.clone(),
        conversation.session_id.clone(),
        result.model.clone(),
        result.summary.clone(),
    );
    db.store_item(evaluation.clone()).await?;

    let mut scores = Vec::with_capacity(result.judgements.len());
    for judgement in result.judgements {
        let score = Score {
            metric_id: judgement.criterion.metric_id.clone(),
            weight: judgement.criterion.weight,
            evaluation_steps: judgement.evaluation_steps,
            reasoning: judgement.reasoning,
            step_by_step_analysis: judgement.step_by_step_analysis,
            ..Score::new(
                evaluation.id.clone(),
                conversation.id.clone(),
                conversation.session_id.clone(),
                judgement.criterion.name,
                judgement.criterion.scoring_type,
                judgement.value,
            )
        };
        db.store_item(score.clone()).await?;
        scores.push(score);
    }

    info!(
        conversation_id,
        evaluation_id = %evaluation.id,
        criteria = scores.len(),
        weighted_score = ?evaluation.summary.weighted_score,
        "Stored conversation evaluation"
    );
    Ok((evaluation, scores))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagEvaluationInput {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(default)]
    pub ground_truth: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Runs the RAGAS metrics for one answer and stores the outcome.
pub async fn evaluate_rag_answer(
    db: &SurrealDbClient,
    language_model: Arc<dyn LanguageModel>,
    input: RagEvaluationInput,
) -> Result<RagEvaluation, AppError> {
    let evaluator = RagasEvaluator::new(language_model).with_model(input.model);
    let scores = evaluator
        .evaluate(
            &input.question,
            &input.answer,
            &input.contexts,
            input.ground_truth.as_deref(),
        )
        .await?;

    let record = RagEvaluation {
        faithfulness: scores.faithfulness,
        answer_relevancy: scores.answer_relevancy,
        context_precision: scores.context_precision,
        context_recall: scores.context_recall,
        overall_score: scores.overall,
        ..RagEvaluation::new(
            input.question,
            input.answer,
            input.contexts,
            input.ground_truth,
            evaluator.model_name(),
        )
    };
    db.store_item(record.clone()).await?;
    Ok(record)
}
