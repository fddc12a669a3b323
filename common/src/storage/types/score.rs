use std::{collections::BTreeMap, fmt, str::FromStr};

use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringType {
    #[default]
    Scale,
    Boolean,
}

impl fmt::Display for ScoringType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scale => write!(f, "scale"),
            Self::Boolean => write!(f, "boolean"),
        }
    }
}

impl FromStr for ScoringType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scale" => Ok(Self::Scale),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(AppError::Validation(format!(
                "unknown scoring type '{other}', expected 'scale' or 'boolean'"
            ))),
        }
    }
}

/// Outcome of judging one criterion. `Unparsed` keeps the record when the
/// judge answered with something that was not the requested JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ScoreValue {
    Scale(f64),
    Boolean(bool),
    Unparsed,
}

impl ScoreValue {
    /// Maps the value onto 0..=10, booleans counting as 0 or 10.
    pub fn normalized(&self) -> Option<f64> {
        match self {
            Self::Scale(value) => Some(value.clamp(0.0, 10.0)),
            Self::Boolean(true) => Some(10.0),
            Self::Boolean(false) => Some(0.0),
            Self::Unparsed => None,
        }
    }

    pub const fn is_parsed(&self) -> bool {
        !matches!(self, Self::Unparsed)
    }
}

stored_object!(Score, "score", {
    evaluation_id: String,
    conversation_id: String,
    session_id: String,
    metric_id: Option<String>,
    metric_name: String,
    scoring_type: ScoringType,
    weight: f64,
    value: ScoreValue,
    evaluation_steps: Vec<String>,
    reasoning: String,
    step_by_step_analysis: String
});

/// Per-metric roll-up over every scored conversation of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAggregate {
    pub metric_name: String,
    pub scoring_type: ScoringType,
    pub scored: usize,
    pub unparsed: usize,
    pub average_score: Option<f64>,
    pub pass_rate: Option<f64>,
}

impl Score {
    pub fn new(
        evaluation_id: String,
        conversation_id: String,
        session_id: String,
        metric_name: String,
        scoring_type: ScoringType,
        value: ScoreValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            evaluation_id,
            conversation_id,
            session_id,
            metric_id: None,
            metric_name,
            scoring_type,
            weight: 1.0,
            value,
            evaluation_steps: Vec::new(),
            reasoning: String::new(),
            step_by_step_analysis: String::new(),
        }
    }

    pub async fn list_for_conversation(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        Ok(db.find_by_field("conversation_id", conversation_id).await?)
    }

    pub async fn list_for_session(
        session_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        Ok(db.find_by_field("session_id", session_id).await?)
    }

    /// Groups scores by metric name, keeping the first-seen scoring type.
    pub fn aggregate_by_metric(scores: &[Self]) -> Vec<MetricAggregate> {
        let mut grouped: BTreeMap<&str, Vec<&Self>> = BTreeMap::new();
        for score in scores {
            grouped.entry(&score.metric_name).or_default().push(score);
        }

        grouped
            .into_iter()
            .filter_map(|(name, group)| {
                let scoring_type = group.first()?.scoring_type;
                let unparsed = group.iter().filter(|s| !s.value.is_parsed()).count();

                let scale_values: Vec<f64> = group
                    .iter()
                    .filter_map(|s| match s.value {
                        ScoreValue::Scale(v) => Some(v),
                        _ => None,
                    })
                    .collect();
                let bool_values: Vec<bool> = group
                    .iter()
                    .filter_map(|s| match s.value {
                        ScoreValue::Boolean(v) => Some(v),
                        _ => None,
                    })
                    .collect();

                let average_score = (!scale_values.is_empty()).then(|| {
                    round_to(
                        scale_values.iter().sum::<f64>() / scale_values.len() as f64,
                        2,
                    )
                });
                let pass_rate = (!bool_values.is_empty()).then(|| {
                    let passed = bool_values.iter().filter(|v| **v).count();
                    round_to(passed as f64 / bool_values.len() as f64 * 100.0, 1)
                });

                Some(MetricAggregate {
                    metric_name: name.to_string(),
                    scoring_type,
                    scored: group.len() - unparsed,
                    unparsed,
                    average_score,
                    pass_rate,
                })
            })
            .collect()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
