use std::sync::Arc;

use common::{
    error::AppError,
    storage::types::{
        conversation_turn::ConversationTurn,
        evaluation::{EvaluationSummary, ScoredOutcome},
        score::{ScoreValue, ScoringType},
    },
    utils::llm::{extract_json_object, CompletionRequest, LanguageModel},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::criteria::EvaluationCriterion;

const UNPARSED_ANALYSIS: &str = "Could not parse structured response";

const SCALE_INSTRUCTION: &str = r#"Provide a score from 0 to 10, where:
- 0-3: Poor/Unsatisfactory
- 4-6: Adequate/Acceptable
- 7-8: Good
- 9-10: Excellent

Your response MUST be in this exact JSON format:
{
  "score": <number between 0 and 10>,
  "reasoning": "<detailed explanation of your evaluation>",
  "step_by_step_analysis": "<analysis following each evaluation step>"
}"#;

const BOOLEAN_INSTRUCTION: &str = r#"Provide a true or false score based on whether the criterion is met.

Your response MUST be in this exact JSON format:
{
  "score": <true or false>,
  "reasoning": "<detailed explanation of your evaluation>",
  "step_by_step_analysis": "<analysis following each evaluation step>"
}"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Judgement {
    pub criterion: EvaluationCriterion,
    pub evaluation_steps: Vec<String>,
    pub value: ScoreValue,
    pub reasoning: String,
    pub step_by_step_analysis: String,
}

impl ScoredOutcome for Judgement {
    fn scoring_type(&self) -> ScoringType {
        self.criterion.scoring_type
    }

    fn score_value(&self) -> &ScoreValue {
        &self.value
    }

    fn weight(&self) -> f64 {
        self.criterion.weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEvaluation {
    pub model: String,
    pub judgements: Vec<Judgement>,
    pub summary: EvaluationSummary,
}

#[derive(Debug, Deserialize)]
struct RawJudgement {
    #[serde(default)]
    score: Value,
    #[serde(default)]
    reasoning: Value,
    #[serde(default)]
    step_by_step_analysis: Value,
}

/// LLM-as-judge: derives evaluation steps for a criterion, then scores a
/// transcript against it.
pub struct LlmJudge {
    language_model: Arc<dyn LanguageModel>,
    model: Option<String>,
}

impl LlmJudge {
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

    pub async fn generate_evaluation_steps(
        &self,
        criterion: &EvaluationCriterion,
    ) -> Result<Vec<String>, AppError> {
        let scale_hint = match criterion.scoring_type {
            ScoringType::Scale => "(0-10 scale)",
            ScoringType::Boolean => "(True/False)",
        };
        let instructions = if criterion.instructions.trim().is_empty() {
            "None"
        } else {
            criterion.instructions.as_str()
        };

        let prompt = format!(
            "You are an expert evaluator. Given an evaluation criterion, generate a clear, step-by-step process to evaluate it.

Criterion Name: {name}
Criterion Description: {description}
Scoring Type: {scoring_type} {scale_hint}
Additional Instructions: {instructions}

Generate 4-6 specific, actionable evaluation steps that an evaluator should follow to assess this criterion.
Each step should be clear and focused on a specific aspect of the evaluation.

Format your response as a numbered list, one step per line.
Example:
1. First evaluation step
2. Second evaluation step
3. Third evaluation step

Your evaluation steps:",
            name = criterion.name,
            description = criterion.description,
            scoring_type = criterion.scoring_type,
        );

        let completion = self
            .language_model
            .complete(CompletionRequest::from_prompt(prompt).with_model(self.model.clone()))
            .await?;

        let steps = parse_steps(&completion.text);
        debug!(criterion = %criterion.name, steps = steps.len(), "Generated evaluation steps");
        Ok(steps)
    }

    pub async fn evaluate_conversation(
        &self,
        turns: &[ConversationTurn],
        criterion: &EvaluationCriterion,
        evaluation_steps: &[String],
    ) -> Result<Judgement, AppError> {
        let conversation_text = turns
            .iter()
            .map(ConversationTurn::transcript_line)
            .collect::<Vec<_>>()
            .join("\n");
        let steps_text = evaluation_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {step}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        let additional = if criterion.instructions.trim().is_empty() {
            String::new()
        } else {
            format!("ADDITIONAL INSTRUCTIONS: {}", criterion.instructions)
        };
        let scoring_instruction = match criterion.scoring_type {
            ScoringType::Scale => SCALE_INSTRUCTION,
            ScoringType::Boolean => BOOLEAN_INSTRUCTION,
        };

        let prompt = format!(
            "You are an expert conversation evaluator. Evaluate the following conversation based on the given criterion.

CRITERION: {name}
DESCRIPTION: {description}
{additional}

EVALUATION STEPS TO FOLLOW:
{steps_text}

CONVERSATION TO EVALUATE:
{conversation_text}

{scoring_instruction}",
            name = criterion.name,
            description = criterion.description,
        );

        let request = CompletionRequest::from_prompt(prompt)
            .with_model(self.model.clone())
            .with_temperature(0.0)
            .with_json_output();
        let completion = self.language_model.complete(request).await?;

        Ok(parse_judgement(
            &completion.text,
            criterion.clone(),
            evaluation_steps.to_vec(),
        ))
    }

    /// Scores `turns` against every criterion in order and summarises the result.
    pub async fn evaluate_transcript(
        &self,
        turns: &[ConversationTurn],
        criteria: &[EvaluationCriterion],
    ) -> Result<TranscriptEvaluation, AppError> {
        if turns.is_empty() {
            return Err(AppError::Validation(
                "No conversation messages found in transcript".into(),
            ));
        }
        if criteria.is_empty() {
            return Err(AppError::Validation(
                "At least one evaluation criterion is required".into(),
            ));
        }

        let mut judgements = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            info!(criterion = %criterion.name, "Evaluating criterion");
            let steps = self.generate_evaluation_steps(criterion).await?;
            let judgement = self.evaluate_conversation(turns, criterion, &steps).await?;
            if !judgement.value.is_parsed() {
                warn!(criterion = %criterion.name, "Judge response could not be parsed");
            }
            judgements.push(judgement);
        }

        let summary = EvaluationSummary::from_judgements(&judgements);
        Ok(TranscriptEvaluation {
            model: self.model_name(),
            judgements,
            summary,
        })
    }
}

/// Keeps lines that start with a digit, `-` or `•`, without their marker.
pub(crate) fn parse_steps(response: &str) -> Vec<String> {
    let steps: Vec<String> = response
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with(|c: char| c.is_ascii_digit()) || line.starts_with(['-', '•'])
        })
        .map(|line| {
            line.trim_start_matches(|c: char| c.is_ascii_digit() || ".-•) ".contains(c))
                .trim()
                .to_string()
        })
        .filter(|step| !step.is_empty())
        .collect();

    if steps.is_empty() {
        vec![response.trim().to_string()]
    } else {
        steps
    }
}

fn parse_judgement(
    response: &str,
    criterion: EvaluationCriterion,
    evaluation_steps: Vec<String>,
) -> Judgement {
    match extract_json_object::<RawJudgement>(response) {
        Ok(raw) => Judgement {
            value: score_value(&raw.score, criterion.scoring_type),
            reasoning: value_text(&raw.reasoning),
            step_by_step_analysis: value_text(&raw.step_by_step_analysis),
            criterion,
            evaluation_steps,
        },
        Err(err) => {
            debug!(error = %err, "Falling back to raw judge response");
            Judgement {
                value: ScoreValue::Unparsed,
                reasoning: response.to_string(),
                step_by_step_analysis: UNPARSED_ANALYSIS.to_string(),
                criterion,
                evaluation_steps,
            }
        }
    }
}

fn score_value(score: &Value, scoring_type: ScoringType) -> ScoreValue {
    match scoring_type {
        ScoringType::Scale => {
            let number = match score {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            number
                .filter(|n| n.is_finite())
                .map_or(ScoreValue::Unparsed, |n| ScoreValue::Scale(n.clamp(0.0, 10.0)))
        }
        ScoringType::Boolean => match score {
            Value::Bool(b) => ScoreValue::Boolean(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => ScoreValue::Boolean(true),
                "false" => ScoreValue::Boolean(false),
                _ => ScoreValue::Unparsed,
            },
            _ => ScoreValue::Unparsed,
        },
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use common::{
        storage::types::conversation_turn::Speaker, utils::llm::ScriptedLanguageModel,
    };

    use super::*;

    fn transcript() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::new(
                "c".into(),
                0,
                Speaker::Agent,
                "Support".into(),
                "Hello! How can I help you today?".into(),
                10,
            ),
            ConversationTurn::new(
                "c".into(),
                1,
                Speaker::Simulator,
                "Customer".into(),
                "My order arrived damaged.".into(),
                12,
            ),
        ]
    }

    fn relevance() -> EvaluationCriterion {
        EvaluationCriterion::new(
            "Response Relevance",
            "Responses stay on topic",
            ScoringType::Scale,
        )
    }

    fn tone() -> EvaluationCriterion {
        EvaluationCriterion::new(
            "Professional Tone",
            "Courteous throughout",
            ScoringType::Boolean,
        )
    }

    #[test]
    fn test_parse_steps_strips_markers() {
        let steps = parse_steps(
            "Here are the steps:\n1. Read the transcript\n2) Check tone\n- Note issues\n• Decide\n\n",
        );
        assert_eq!(
            steps,
            vec!["Read the transcript", "Check tone", "Note issues", "Decide"]
        );
    }

    #[test]
    fn test_parse_steps_falls_back_to_response() {
        assert_eq!(
            parse_steps("  Just read it carefully.  "),
            vec!["Just read it carefully."]
        );
    }

    #[test]
    fn test_scale_scores_are_clamped_and_coerced() {
        assert_eq!(
            score_value(&serde_json::json!(14), ScoringType::Scale),
            ScoreValue::Scale(10.0)
        );
        assert_eq!(
            score_value(&serde_json::json!("7.5"), ScoringType::Scale),
            ScoreValue::Scale(7.5)
        );
        assert_eq!(
            score_value(&Value::Null, ScoringType::Scale),
            ScoreValue::Unparsed
        );
        assert_eq!(
            score_value(&serde_json::json!("True"), ScoringType::Boolean),
            ScoreValue::Boolean(true)
        );
        assert_eq!(
            score_value(&serde_json::json!(1), ScoringType::Boolean),
            ScoreValue::Unparsed
        );
    }

    #[tokio::test]
    async fn test_evaluate_conversation_parses_json() {
        let model = Arc::new(ScriptedLanguageModel::new([
            r#"```json
{"score": 8, "reasoning": "On topic", "step_by_step_analysis": "1. fine"}
```"#,
        ]));
        let judge = LlmJudge::new(model.clone());

        let judgement = judge
            .evaluate_conversation(&transcript(), &relevance(), &["Read".to_string()])
            .await
            .unwrap();

        assert_eq!(judgement.value, ScoreValue::Scale(8.0));
        assert_eq!(judgement.reasoning, "On topic");
        assert_eq!(judgement.evaluation_steps, vec!["Read"]);

        let request = &model.requests()[0];
        assert!(request.json_output);
        let prompt = &request.turns[0].content;
        assert!(prompt.contains("Support: Hello! How can I help you today?"));
        assert!(prompt.contains("1. Read"));
        assert!(prompt.contains("0-3: Poor/Unsatisfactory"));
    }

    #[tokio::test]
    async fn test_unparsable_response_is_kept() {
        let model = Arc::new(ScriptedLanguageModel::new(["I think it was fine."]));
        let judge = LlmJudge::new(model);

        let judgement = judge
            .evaluate_conversation(&transcript(), &tone(), &[])
            .await
            .unwrap();

        assert_eq!(judgement.value, ScoreValue::Unparsed);
        assert_eq!(judgement.reasoning, "I think it was fine.");
        assert_eq!(judgement.step_by_step_analysis, UNPARSED_ANALYSIS);
    }

    #[tokio::test]
    async fn test_evaluate_transcript_runs_each_criterion() {
        let model = Arc::new(ScriptedLanguageModel::new([
            "1. Check relevance\n2. Check focus",
            r#"{"score": 9, "reasoning": "Great", "step_by_step_analysis": "ok"}"#,
            "1. Check tone",
            r#"{"score": false, "reasoning": "Curt", "step_by_step_analysis": "ok"}"#,
        ]));
        let judge = LlmJudge::new(model.clone()).with_model(Some("judge-x".into()));

        let evaluation = judge
            .evaluate_transcript(&transcript(), &[relevance(), tone()])
            .await
            .unwrap();

        assert_eq!(evaluation.model, "judge-x");
        assert_eq!(evaluation.judgements.len(), 2);
        assert_eq!(
            evaluation.judgements[0].evaluation_steps,
            vec!["Check relevance", "Check focus"]
        );
        assert_eq!(evaluation.judgements[1].value, ScoreValue::Boolean(false));
        assert_eq!(evaluation.summary.total_criteria, 2);
        assert_eq!(evaluation.summary.average_scale_score, Some(9.0));
        assert_eq!(evaluation.summary.boolean_pass_rate, Some(0.0));
        assert_eq!(evaluation.summary.weighted_score, Some(4.5));
        assert!(model
            .requests()
            .iter()
            .all(|r| r.model.as_deref() == Some("judge-x")));
    }

    #[tokio::test]
    async fn test_empty_transcript_is_rejected() {
        let judge = LlmJudge::new(Arc::new(ScriptedLanguageModel::default()));
        let result = judge.evaluate_transcript(&[], &[relevance()]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
