use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::conversation_turn::ConversationTurn,
    utils::llm::{extract_json_object, CompletionRequest, LanguageModel},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

const RECENT_TURNS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalCheck {
    pub goal_met: bool,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawGoalCheck {
    #[serde(default)]
    goal_met: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    reasoning: Value,
}

/// Asks a model whether a running conversation has reached its goal, or a
/// natural ending when no goal is set.
pub struct GoalDetector {
    language_model: Arc<dyn LanguageModel>,
    model: Option<String>,
}

impl GoalDetector {
    pub fn new(language_model: Arc<dyn LanguageModel>) -> Self {
        Self {
            language_model,
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Never fails; detection errors are reported as "not met".
    pub async fn check_goal_met(&self, turns: &[ConversationTurn], goal: Option<&str>) -> GoalCheck {
        match self.detect(turns, goal).await {
            Ok(check) => check,
            Err(err) => {
                error!(error = %err, "Error in goal detection");
                GoalCheck {
                    goal_met: false,
                    confidence: 0.0,
                    reasoning: format!("Error during detection: {err}"),
                }
            }
        }
    }

    async fn detect(
        &self,
        turns: &[ConversationTurn],
        goal: Option<&str>,
    ) -> Result<GoalCheck, AppError> {
        let prompt = build_prompt(turns, goal);
        let request = CompletionRequest::from_prompt(prompt)
            .with_model(self.model.clone())
            .with_temperature(0.2)
            .with_json_output();

        let completion = self.language_model.complete(request).await?;
        let raw: RawGoalCheck = extract_json_object(&completion.text)?;

        let check = GoalCheck {
            goal_met: match &raw.goal_met {
                Value::Bool(b) => *b,
                Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
                _ => false,
            },
            confidence: match &raw.confidence {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
                _ => 0.0,
            }
            .clamp(0.0, 1.0),
            reasoning: match raw.reasoning {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            },
        };
        debug!(goal_met = check.goal_met, confidence = check.confidence, "Goal check finished");
        Ok(check)
    }
}

fn build_prompt(turns: &[ConversationTurn], goal: Option<&str>) -> String {
    let start = turns.len().saturating_sub(RECENT_TURNS);
    let conversation_text: String = turns
        .get(start..)
        .unwrap_or_default()
        .iter()
        .filter(|turn| !turn.content.is_empty())
        .map(|turn| format!("{}\n", turn.transcript_line()))
        .collect();

    let response_format = r#"{
    "goal_met": true/false,
    "confidence": 0.0-1.0,
    "reasoning": "brief explanation"
}"#;

    match goal.map(str::trim).filter(|g| !g.is_empty()) {
        Some(goal) => format!(
            "Analyze this conversation to determine if the stated goal has been achieved.

Goal: {goal}

Recent Conversation:
{conversation_text}
Determine if the conversation goal has been met. Respond with JSON:
{response_format}"
        ),
        None => format!(
            "Analyze this conversation to determine if it has reached a natural conclusion.

Recent Conversation:
{conversation_text}
Determine if the conversation has naturally concluded (e.g., both parties have said goodbye, \
the main topic is resolved, or there's a clear ending). Respond with JSON:
{response_format}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use common::{
        storage::types::conversation_turn::Speaker, utils::llm::ScriptedLanguageModel,
    };

    use super::*;

    fn turns(count: u32) -> Vec<ConversationTurn> {
        (0..count)
            .map(|i| {
                ConversationTurn::new(
                    "c".into(),
                    i,
                    if i % 2 == 0 {
                        Speaker::Agent
                    } else {
                        Speaker::Simulator
                    },
                    format!("Bot {}", i % 2 + 1),
                    format!("message {i}"),
                    5,
                )
            })
            .collect()
    }

    #[test]
    fn test_prompt_uses_last_ten_turns() {
        let prompt = build_prompt(&turns(14), Some("Refund issued"));
        assert!(prompt.contains("Goal: Refund issued"));
        assert!(!prompt.contains("message 3\n"));
        assert!(prompt.contains("Bot 1: message 4\n"));
        assert!(prompt.contains("message 13"));
    }

    #[test]
    fn test_prompt_without_goal_asks_for_conclusion() {
        let prompt = build_prompt(&turns(2), None);
        assert!(prompt.contains("natural conclusion"));
        assert!(!prompt.contains("Goal:"));
    }

    #[tokio::test]
    async fn test_goal_met_response() {
        let model = Arc::new(ScriptedLanguageModel::new([
            r#"{"goal_met": true, "confidence": 0.92, "reasoning": "Refund confirmed"}"#,
        ]));
        let detector = GoalDetector::new(model.clone());

        let check = detector.check_goal_met(&turns(4), Some("Refund")).await;
        assert!(check.goal_met);
        assert!((check.confidence - 0.92).abs() < 1e-9);
        assert_eq!(check.reasoning, "Refund confirmed");

        let request = &model.requests()[0];
        assert_eq!(request.temperature, Some(0.2));
        assert!(request.json_output);
    }

    #[tokio::test]
    async fn test_errors_default_to_not_met() {
        let model = Arc::new(ScriptedLanguageModel::new(["not json at all"]));
        let detector = GoalDetector::new(model);

        let check = detector.check_goal_met(&turns(2), None).await;
        assert!(!check.goal_met);
        assert_eq!(check.confidence, 0.0);
        assert!(check.reasoning.starts_with("Error during detection:"));
    }

    #[tokio::test]
    async fn test_model_failure_defaults_to_not_met() {
        let model = Arc::new(ScriptedLanguageModel::default());
        model.push_error("upstream unavailable");
        let detector = GoalDetector::new(model);

        let check = detector.check_goal_met(&turns(2), Some("x")).await;
        assert!(!check.goal_met);
        assert!(check.reasoning.contains("upstream unavailable"));
    }
}
