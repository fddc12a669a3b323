use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::score::{round_to, ScoreValue, ScoringType};

/// Anything carrying a judged value and the weight of its criterion.
pub trait ScoredOutcome {
    fn scoring_type(&self) -> ScoringType;
    fn score_value(&self) -> &ScoreValue;
    fn weight(&self) -> f64;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_criteria: usize,
    pub scale_criteria_count: usize,
    pub boolean_criteria_count: usize,
    pub average_scale_score: Option<f64>,
    pub boolean_pass_rate: Option<f64>,
    pub weighted_score: Option<f64>,
}

impl EvaluationSummary {
    pub fn from_judgements<J: ScoredOutcome>(judgements: &[J]) -> Self {
        let scale_criteria_count = judgements
            .iter()
            .filter(|j| j.scoring_type() == ScoringType::Scale)
            .count();
        let boolean_criteria_count = judgements
            .iter()
            .filter(|j| j.scoring_type() == ScoringType::Boolean)
            .count();

        let scale_scores: Vec<f64> = judgements
            .iter()
            .filter_map(|j| match j.score_value() {
                ScoreValue::Scale(value) => Some(*value),
                _ => None,
            })
            .collect();
        let boolean_scores: Vec<bool> = judgements
            .iter()
            .filter_map(|j| match j.score_value() {
                ScoreValue::Boolean(value) => Some(*value),
                _ => None,
            })
            .collect();

        let average_scale_score = (!scale_scores.is_empty()).then(|| {
            round_to(
                scale_scores.iter().sum::<f64>() / scale_scores.len() as f64,
                2,
            )
        });
        let boolean_pass_rate = (!boolean_scores.is_empty()).then(|| {
            let passed = boolean_scores.iter().filter(|v| **v).count();
            round_to(passed as f64 / boolean_scores.len() as f64 * 100.0, 1)
        });

        Self {
            total_criteria: judgements.len(),
            scale_criteria_count,
            boolean_criteria_count,
            average_scale_score,
            boolean_pass_rate,
            weighted_score: weighted_score(judgements),
        }
    }
}

/// Weighted mean on the 0..=10 scale over parsed judgements. `None` when
/// nothing parsed or the weights sum to zero.
pub fn weighted_score<J: ScoredOutcome>(judgements: &[J]) -> Option<f64> {
    let (weighted_sum, total_weight) = judgements
        .iter()
        .filter_map(|j| {
            let weight = j.weight();
            (weight.is_finite() && weight >= 0.0)
                .then_some(())
                .and(j.score_value().normalized())
                .map(|value| (value * weight, weight))
        })
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value, total + weight)
        });

    (total_weight > 0.0).then(|| round_to(weighted_sum / total_weight, 2))
}

stored_object!(Evaluation, "evaluation", {
    conversation_id: String,
    session_id: String,
    model: String,
    summary: EvaluationSummary
});

impl Evaluation {
    pub fn new(
        conversation_id: String,
        session_id: String,
        model: String,
        summary: EvaluationSummary,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id,
            session_id,
            model,
            summary,
        }
    }

    pub async fn list_for_conversation(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        Ok(db.find_by_field("conversation_id", conversation_id).await?)
    }

    /// Most recent evaluation of a conversation, if it was ever scored.
    pub async fn latest_for_conversation(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        Ok(Self::list_for_conversation(conversation_id, db)
            .await?
            .into_iter()
            .last())
    }
}
