//! RAGAS-style scoring of a single retrieval-augmented answer.
//!
//! Faithfulness, answer relevancy, context precision and context recall are
//! each judged by the model on a 0..=1 scale, concurrently. The overall score
//! is a static weighted average over whichever metrics produced a value.

use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::score::round_to,
    utils::llm::{extract_json_object, CompletionRequest, LanguageModel},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const FAITHFULNESS_WEIGHT: f64 = 0.3;
pub const ANSWER_RELEVANCY_WEIGHT: f64 = 0.3;
pub const CONTEXT_PRECISION_WEIGHT: f64 = 0.2;
pub const CONTEXT_RECALL_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RagasScores {
    pub faithfulness: Option<f64>,
    pub answer_relevancy: Option<f64>,
    pub context_precision: Option<f64>,
    pub context_recall: Option<f64>,
    pub overall: Option<f64>,
}

impl RagasScores {
    /// Weighted mean of the metrics present, renormalised over their weights.
    pub fn weighted_overall(&self) -> Option<f64> {
        let (sum, total) = [
            (self.faithfulness, FAITHFULNESS_WEIGHT),
            (self.answer_relevancy, ANSWER_RELEVANCY_WEIGHT),
            (self.context_precision, CONTEXT_PRECISION_WEIGHT),
            (self.context_recall, CONTEXT_RECALL_WEIGHT),
        ]
        .into_iter()
        .filter_map(|(score, weight)| score.map(|s| (s * weight, weight)))
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value, total + weight)
        });

        (total > 0.0).then(|| round_to(sum / total, 4))
    }
}

pub struct RagasEvaluator {
    language_model: Arc<dyn LanguageModel>,
    model: Option<String>,
}

impl RagasEvaluator {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            language_model,
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.language_model.default_model().to_string())
    }

    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        contexts: &[String],
        ground_truth: Option<&str>,
    ) -> Result<RagasScores, AppError> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(AppError::Validation(
                "RAGAS evaluation requires a question and an answer".into(),
            ));
        }
        if contexts.is_empty() {
            return Err(AppError::Validation(
                "RAGAS evaluation requires retrieved context".into(),
            ));
        }

        let ground_truth = ground_truth.map(str::trim).filter(|g| !g.is_empty());
        let context_block = contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[Chunk {i}]: {c}"))
            .collect::<Vec<_>>()
            .join("\n\n");

        let (faithfulness, answer_relevancy, context_precision, context_recall) = tokio::join!(
            self.score_metric(
                "faithfulness",
                faithfulness_prompt(&context_block, answer),
                "faithfulness_score"
            ),
            self.score_metric(
                "answer_relevancy",
                answer_relevancy_prompt(question, answer),
                "relevance_score"
            ),
            self.score_metric(
                "context_precision",
                context_precision_prompt(question, &context_block, answer),
                "precision_score"
            ),
            async {
                match ground_truth {
                    Some(truth) => {
                        self.score_metric(
                            "context_recall",
                            context_recall_prompt(question, &context_block, truth),
                            "recall_score",
                        )
                        .await
                    }
                    None => None,
                }
            }
        );

        let mut scores = RagasScores {
            faithfulness,
            answer_relevancy,
            context_precision,
            context_recall,
            overall: None,
        };
        scores.overall = scores.weighted_overall();

        info!(
            overall = ?scores.overall,
            faithfulness = ?scores.faithfulness,
            answer_relevancy = ?scores.answer_relevancy,
            context_precision = ?scores.context_precision,
            context_recall = ?scores.context_recall,
            "RAGAS evaluation finished"
        );
        Ok(scores)
    }

    /// A failing metric is logged and left out rather than failing the run.
    async fn score_metric(&self, metric: &str, prompt: String, field: &str) -> Option<f64> {
        let request = CompletionRequest::from_prompt(prompt)
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .with_json_output();

        let result = match self.language_model.complete(request).await {
            Ok(completion) => extract_json_object::<Value>(&completion.text),
            Err(err) => Err(err),
        };

        match result {
            Ok(json) => {
                let score = match &json[field] {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                if score.is_none() {
                    warn!(metric, field, "RAGAS response is missing its score field");
                }
                score
                    .filter(|s| s.is_finite())
                    .map(|s| s.clamp(0.0, 1.0))
            }
            Err(err) => {
                warn!(metric, error = %err, "RAGAS metric failed");
                None
            }
        }
    }
}

fn faithfulness_prompt(context: &str, answer: &str) -> String {
    format!(
        r#"Evaluate if the answer is faithful to the context (no hallucinations).

CONTEXT:
{context}

ANSWER:
{answer}

Extract all claims from the answer and verify each against the context.

Respond in JSON:
{{
  "claims": [
    {{"claim": "...", "supported": true, "evidence": "..."}}
  ],
  "faithfulness_score": <float 0-1, fraction of supported claims>
}}"#
    )
}

fn answer_relevancy_prompt(question: &str, answer: &str) -> String {
    format!(
        r#"Evaluate how relevant the answer is to the question.

QUESTION:
{question}

ANSWER:
{answer}

Determine:
1. Does the answer directly address the question?
2. Is the answer complete?
3. Is there unnecessary information?

Respond in JSON:
{{
  "addresses_question": <boolean>,
  "is_complete": <boolean>,
  "has_unnecessary_info": <boolean>,
  "relevance_score": <float 0-1>,
  "reasoning": "<explanation>"
}}"#
    )
}

fn context_precision_prompt(question: &str, context: &str, answer: &str) -> String {
    format!(
        r#"Evaluate the precision of the retrieved context for answering the question.

QUESTION:
{question}

RETRIEVED CONTEXT (in order):
{context}

ANSWER:
{answer}

For each piece of context, determine if it was relevant for generating the answer.
Relevant chunks ranked higher should count more.

Respond in JSON:
{{
  "context_relevance": [
    {{"chunk_index": 0, "is_relevant": true, "reasoning": "..."}}
  ],
  "precision_score": <float 0-1>
}}"#
    )
}

fn context_recall_prompt(question: &str, context: &str, ground_truth: &str) -> String {
    format!(
        r#"Evaluate whether the retrieved context contains the information needed for the reference answer.

QUESTION:
{question}

RETRIEVED CONTEXT:
{context}

REFERENCE ANSWER:
{ground_truth}

Split the reference answer into individual statements and decide for each whether it can be attributed to the retrieved context.

Respond in JSON:
{{
  "statements": [
    {{"statement": "...", "attributed": true}}
  ],
  "recall_score": <float 0-1, fraction of attributed statements>
}}"#
    )
}
