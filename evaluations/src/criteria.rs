use common::{
    error::AppError,
    storage::types::{score::ScoringType, scoring_metric::ScoringMetric},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single user-defined yardstick for judging a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriterion {
    pub metric_id: Option<String>,
    pub name: String,
    pub description: String,
    pub scoring_type: ScoringType,
    pub instructions: String,
    pub weight: f64,
}

impl EvaluationCriterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>, scoring_type: ScoringType) -> Self {
        Self {
            metric_id: None,
            name: name.into(),
            description: description.into(),
            scoring_type,
            instructions: String::new(),
            weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.description.trim().is_empty()
    }
}

impl From<&ScoringMetric> for EvaluationCriterion {
    fn from(metric: &ScoringMetric) -> Self {
        Self {
            metric_id: Some(metric.id.clone()),
            name: metric.name.trim().to_string(),
            description: metric.description.trim().to_string(),
            scoring_type: metric.scoring_type,
            instructions: metric.instructions.trim().to_string(),
            weight: metric.weight,
        }
    }
}

/// Converts metrics to criteria, skipping any without a name or description.
pub fn criteria_from_metrics(metrics: &[ScoringMetric]) -> Result<Vec<EvaluationCriterion>, AppError> {
    let criteria: Vec<EvaluationCriterion> = metrics
        .iter()
        .map(EvaluationCriterion::from)
        .filter(|criterion| {
            let complete = criterion.is_complete();
            if !complete {
                warn!(metric_id = ?criterion.metric_id, "Skipping incomplete scoring metric");
            }
            complete
        })
        .collect();

    if criteria.is_empty() {
        return Err(AppError::Validation(
            "No valid evaluation criteria; every metric needs a name and a description".into(),
        ));
    }

    Ok(criteria)
}
