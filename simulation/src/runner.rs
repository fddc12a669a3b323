use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            conversation::{Conversation, EndReason, LatencySummary},
            conversation_turn::{ConversationTurn, Speaker},
            test_case::TestCase,
            test_session::TestSession,
        },
    },
    utils::llm::{ChatTurn, CompletionRequest, LanguageModel},
};
use evaluations::GoalDetector;
use tracing::{debug, error, info, instrument};

use crate::tracer::SimulationTracer;

/// Sent as the first user message to whichever bot opens the conversation.
pub const GREETING_CUE: &str = "Hello! I'm ready to start our conversation.";
/// A positive goal check must exceed this confidence to end the run.
pub const GOAL_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Minimum number of turns between two goal checks.
pub const GOAL_CHECK_INTERVAL: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotProfile {
    pub name: String,
    pub system_prompt: String,
}

impl BotProfile {
    pub fn new(name: impl Into<String>, role_prompt: &str) -> Self {
        let name = name.into();
        let system_prompt = normalize_prompt(&format!(
            "You are a helpful AI assistant named {name}. {role_prompt} Keep your responses concise."
        ));
        Self {
            name,
            system_prompt,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub conversation_id: String,
    pub agent: BotProfile,
    pub simulator: BotProfile,
    pub goal: Option<String>,
    pub max_turns: u32,
    /// No time limit when `None`.
    pub max_duration: Option<Duration>,
    pub agent_speaks_first: bool,
    pub model: Option<String>,
}

impl SimulationPlan {
    pub fn for_test_case(
        conversation_id: String,
        session: &TestSession,
        test_case: &TestCase,
        persona_prompt: &str,
        max_duration: Option<Duration>,
    ) -> Self {
        let role_prompt = if test_case.scenario.trim().is_empty() {
            persona_prompt.to_string()
        } else {
            format!("{persona_prompt} Scenario: {}", test_case.scenario.trim())
        };

        Self {
            conversation_id,
            agent: BotProfile::new(session.agent_name.clone(), &session.agent_prompt),
            simulator: BotProfile::new(test_case.persona_name.clone(), &role_prompt),
            goal: test_case.effective_goal(session).map(str::to_string),
            max_turns: test_case.effective_max_turns(session).max(1),
            max_duration,
            agent_speaks_first: test_case.agent_speaks_first,
            model: None,
        }
    }

    fn bot(&self, speaker: Speaker) -> &BotProfile {
        match speaker {
            Speaker::Agent => &self.agent,
            Speaker::Simulator => &self.simulator,
        }
    }

    fn opening_speaker(&self) -> Speaker {
        if self.agent_speaks_first {
            Speaker::Agent
        } else {
            Speaker::Simulator
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub conversation_id: String,
    pub end_reason: EndReason,
    pub goal_reasoning: Option<String>,
    pub turns: Vec<ConversationTurn>,
    pub metrics: LatencySummary,
}

/// Drives two language-model bots against each other, one turn at a time.
pub struct SimulationRunner {
    db: Arc<SurrealDbClient>,
    language_model: Arc<dyn LanguageModel>,
    goal_detector: GoalDetector,
}

impl SimulationRunner {
    pub fn new(db: Arc<SurrealDbClient>, language_model: Arc<dyn LanguageModel>) -> Self {
        let goal_detector = GoalDetector::new(Arc::clone(&language_model));
        Self {
            db,
            language_model,
            goal_detector,
        }
    }

    #[must_use]
    pub fn with_goal_model(mut self, model: Option<String>) -> Self {
        self.goal_detector = GoalDetector::new(Arc::clone(&self.language_model)).with_model(model);
        self
    }

    #[instrument(skip_all, fields(conversation_id = %plan.conversation_id))]
    pub async fn run(
        &self,
        plan: &SimulationPlan,
        stop_flag: &AtomicBool,
    ) -> Result<SimulationOutcome, AppError> {
        let started = Instant::now();
        let mut tracer = SimulationTracer::new();
        let mut turns: Vec<ConversationTurn> = Vec::new();
        let mut goal_reasoning: Option<String> = None;
        let mut last_goal_check: Option<usize> = None;
        let mut speaker = plan.opening_speaker();

        info!(
            max_turns = plan.max_turns,
            has_goal = plan.goal.is_some(),
            "Starting simulation"
        );

        let end_reason = loop {
            if stop_flag.load(Ordering::SeqCst) {
                break EndReason::StoppedByUser;
            }

            let turn_index = u32::try_from(turns.len()).unwrap_or(u32::MAX);
            let turn = match self.take_turn(plan, speaker, turn_index, &turns).await {
                Ok(turn) => turn,
                Err(err) => {
                    error!(turn_index, error = %err, "Simulation turn failed");
                    goal_reasoning = Some(format!("Simulation failed: {err}"));
                    break EndReason::Error;
                }
            };
            tracer.record_turn(turn_index, Duration::from_millis(turn.latency_ms));
            turns.push(turn);

            if stop_flag.load(Ordering::SeqCst) {
                break EndReason::StoppedByUser;
            }
            if turns.len() >= plan.max_turns as usize {
                break EndReason::MaxTurns;
            }
            if plan.max_duration.is_some_and(|limit| started.elapsed() >= limit) {
                break EndReason::TimeLimit;
            }
            let goal_check_due = last_goal_check
                .map_or(true, |at| turns.len() >= at.saturating_add(GOAL_CHECK_INTERVAL));
            if speaker == Speaker::Agent && both_have_spoken(&turns) && goal_check_due {
                last_goal_check = Some(turns.len());
                let check = self
                    .goal_detector
                    .check_goal_met(&turns, plan.goal.as_deref())
                    .await;
                debug!(
                    goal_met = check.goal_met,
                    confidence = check.confidence,
                    "Goal check"
                );
                let reached = check.goal_met && check.confidence > GOAL_CONFIDENCE_THRESHOLD;
                goal_reasoning = Some(check.reasoning);
                if reached {
                    break EndReason::GoalMet;
                }
            }

            speaker = other(speaker);
        };

        let metrics = tracer.summary();
        Conversation::finish(
            &plan.conversation_id,
            end_reason,
            goal_reasoning.clone(),
            metrics.clone(),
            &self.db,
        )
        .await?;

        info!(
            ?end_reason,
            turns = turns.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            mean_latency_ms = metrics.mean_ms,
            "Simulation finished"
        );

        Ok(SimulationOutcome {
            conversation_id: plan.conversation_id.clone(),
            end_reason,
            goal_reasoning,
            turns,
            metrics,
        })
    }

    async fn take_turn(
        &self,
        plan: &SimulationPlan,
        speaker: Speaker,
        turn_index: u32,
        history: &[ConversationTurn],
    ) -> Result<ConversationTurn, AppError> {
        let bot = plan.bot(speaker);
        let request = CompletionRequest {
            model: plan.model.clone(),
            turns: bot_messages(bot, speaker, plan.opening_speaker() == speaker, history),
            temperature: Some(0.7),
            json_output: false,
        };

        let started = Instant::now();
        let completion = self.language_model.complete(request).await?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let content = completion.text.trim().to_string();
        if content.is_empty() {
            return Err(AppError::LLMParsing(format!(
                "{} produced an empty response",
                bot.name
            )));
        }

        let turn = ConversationTurn::new(
            plan.conversation_id.clone(),
            turn_index,
            speaker,
            bot.name.clone(),
            content,
            latency_ms,
        );
        self.db.store_item(turn.clone()).await?;
        Ok(turn)
    }
}

/// Builds one bot's view of the conversation: its own turns are `assistant`
/// messages, the other bot's are `user` messages.
fn bot_messages(
    bot: &BotProfile,
    speaker: Speaker,
    opens: bool,
    history: &[ConversationTurn],
) -> Vec<ChatTurn> {
    let mut messages = Vec::with_capacity(history.len().saturating_add(2));
    messages.push(ChatTurn::system(bot.system_prompt.clone()));
    if opens {
        messages.push(ChatTurn::user(GREETING_CUE));
    }
    messages.extend(history.iter().map(|turn| {
        if turn.speaker == speaker {
            ChatTurn::assistant(turn.content.clone())
        } else {
            ChatTurn::user(turn.content.clone())
        }
    }));
    messages
}

fn both_have_spoken(turns: &[ConversationTurn]) -> bool {
    turns.iter().any(|t| t.speaker == Speaker::Agent)
        && turns.iter().any(|t| t.speaker == Speaker::Simulator)
}

const fn other(speaker: Speaker) -> Speaker {
    match speaker {
        Speaker::Agent => Speaker::Simulator,
        Speaker::Simulator => Speaker::Agent,
    }
}

/// Collapses line breaks to single spaces and trims the result.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use common::{
        storage::types::conversation::ConversationStatus,
        utils::llm::{ChatRole, ScriptedLanguageModel},
    };
    use uuid::Uuid;

    use super::*;

    async fn setup() -> (Arc<SurrealDbClient>, Conversation) {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        let conversation =
            Conversation::new_simulated("s".into(), "tc".into(), "Ira".into(), "Caller".into());
        db.store_item(conversation.clone()).await.unwrap();
        (Arc::new(db), conversation)
    }

    fn plan(conversation_id: &str, max_turns: u32, goal: Option<&str>) -> SimulationPlan {
        SimulationPlan {
            conversation_id: conversation_id.to_string(),
            agent: BotProfile::new("Ira", "You help customers."),
            simulator: BotProfile::new("Caller", "You have a failed payment."),
            goal: goal.map(str::to_string),
            max_turns,
            max_duration: None,
            agent_speaks_first: true,
            model: None,
        }
    }

    const NOT_MET: &str = r#"{"goal_met": false, "confidence": 0.1, "reasoning": "still talking"}"#;

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(
            normalize_prompt("  You are Ira.\n\n  Be warm.\r\nBe brief.  "),
            "You are Ira. Be warm. Be brief."
        );
    }

    #[test]
    fn test_bot_profile_wraps_role_prompt() {
        let bot = BotProfile::new("Ira", "Line one.\nLine two.");
        assert_eq!(
            bot.system_prompt,
            "You are a helpful AI assistant named Ira. Line one. Line two. Keep your responses concise."
        );
    }

    #[tokio::test]
    async fn test_runs_until_max_turns() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::new([
            "Namaste, how can I help?",
            "My payment failed.",
            "Let me check.",
            NOT_MET,
            "Thanks.",
        ]));
        let runner = SimulationRunner::new(Arc::clone(&db), model.clone());

        let outcome = runner
            .run(&plan(&conversation.id, 4, None), &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(outcome.end_reason, EndReason::MaxTurns);
        assert_eq!(outcome.turns.len(), 4);
        assert_eq!(outcome.metrics.turn_count, 4);
        let speakers: Vec<Speaker> = outcome.turns.iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            [Speaker::Agent, Speaker::Simulator, Speaker::Agent, Speaker::Simulator]
        );
        assert_eq!(outcome.goal_reasoning.as_deref(), Some("still talking"));

        let stored = ConversationTurn::list_for_conversation(&conversation.id, &db)
            .await
            .unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[2].content, "Let me check.");

        let finished = Conversation::get(&conversation.id, &db).await.unwrap();
        assert_eq!(finished.status, ConversationStatus::Completed);
        assert_eq!(finished.end_reason, Some(EndReason::MaxTurns));
        assert_eq!(finished.metrics.map(|m| m.turn_count), Some(4));
    }

    #[tokio::test]
    async fn test_each_bot_sees_its_own_turns_as_assistant() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::new([
            "Hello from Ira",
            "Hello from Caller",
            "Ira again",
        ]));
        let runner = SimulationRunner::new(db, model.clone());

        // The turn limit is reached before the first goal check.
        runner
            .run(&plan(&conversation.id, 3, None), &AtomicBool::new(false))
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 3);

        let agent_first: Vec<ChatRole> = requests[0].turns.iter().map(|t| t.role).collect();
        assert_eq!(agent_first, [ChatRole::System, ChatRole::User]);
        assert_eq!(requests[0].turns[1].content, GREETING_CUE);

        let caller: Vec<ChatRole> = requests[1].turns.iter().map(|t| t.role).collect();
        assert_eq!(caller, [ChatRole::System, ChatRole::User]);
        assert_eq!(requests[1].turns[1].content, "Hello from Ira");
        assert!(requests[1].turns[0].content.contains("named Caller"));

        let agent_second: Vec<ChatRole> = requests[2].turns.iter().map(|t| t.role).collect();
        assert_eq!(
            agent_second,
            [
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
    }

    #[tokio::test]
    async fn test_goal_met_ends_after_agent_turn() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::new([
            "Hi",
            "I need a refund",
            "Refund issued.",
            r#"{"goal_met": true, "confidence": 0.95, "reasoning": "Refund issued"}"#,
        ]));
        let runner = SimulationRunner::new(Arc::clone(&db), model.clone());

        let outcome = runner
            .run(
                &plan(&conversation.id, 10, Some("Issue a refund")),
                &AtomicBool::new(false),
            )
            .await
            .unwrap();

        assert_eq!(outcome.end_reason, EndReason::GoalMet);
        assert_eq!(outcome.turns.len(), 3);
        assert_eq!(outcome.goal_reasoning.as_deref(), Some("Refund issued"));
        // No goal check after the first agent turn.
        assert_eq!(model.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_goal_checks_are_spaced_out() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::new([
            "t1", "t2", "t3", NOT_MET, "t4", "t5", "t6", "t7", NOT_MET, "t8",
        ]));
        let runner = SimulationRunner::new(db, model.clone());

        let outcome = runner
            .run(&plan(&conversation.id, 8, None), &AtomicBool::new(false))
            .await
            .unwrap();

        assert_eq!(outcome.end_reason, EndReason::MaxTurns);
        let contents: Vec<&str> = outcome.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8"]);
        // Agent turns 3 and 7 are checked, turn 5 is skipped.
        let goal_prompts = model
            .requests()
            .iter()
            .filter(|request| request.json_output)
            .count();
        assert_eq!(goal_prompts, 2);
    }

    #[tokio::test]
    async fn test_low_confidence_goal_does_not_stop() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::new([
            "Hi",
            "Hello",
            "Anything else?",
            r#"{"goal_met": true, "confidence": 0.5, "reasoning": "maybe"}"#,
            "Bye",
        ]));
        let runner = SimulationRunner::new(db, model);

        let outcome = runner
            .run(&plan(&conversation.id, 4, None), &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(outcome.end_reason, EndReason::MaxTurns);
        assert_eq!(outcome.turns.len(), 4);
        assert_eq!(outcome.goal_reasoning.as_deref(), Some("maybe"));
    }

    #[tokio::test]
    async fn test_stop_flag_and_time_limit() {
        let (db, conversation) = setup().await;
        let runner = SimulationRunner::new(
            Arc::clone(&db),
            Arc::new(ScriptedLanguageModel::default().with_fallback("...")),
        );

        let stopped = runner
            .run(&plan(&conversation.id, 10, None), &AtomicBool::new(true))
            .await
            .unwrap();
        assert_eq!(stopped.end_reason, EndReason::StoppedByUser);
        assert!(stopped.turns.is_empty());
        let record = Conversation::get(&conversation.id, &db).await.unwrap();
        assert_eq!(record.status, ConversationStatus::Stopped);

        let mut timed = plan(&conversation.id, 10, None);
        timed.max_duration = Some(Duration::ZERO);
        let outcome = runner.run(&timed, &AtomicBool::new(false)).await.unwrap();
        assert_eq!(outcome.end_reason, EndReason::TimeLimit);
        assert_eq!(outcome.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_model_error_fails_conversation() {
        let (db, conversation) = setup().await;
        let model = Arc::new(ScriptedLanguageModel::default());
        model.push_error("quota exceeded");
        let runner = SimulationRunner::new(Arc::clone(&db), model);

        let outcome = runner
            .run(&plan(&conversation.id, 10, None), &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(outcome.end_reason, EndReason::Error);
        assert!(outcome
            .goal_reasoning
            .as_deref()
            .is_some_and(|r| r.contains("quota exceeded")));

        let record = Conversation::get(&conversation.id, &db).await.unwrap();
        assert_eq!(record.status, ConversationStatus::Failed);
    }

    #[test]
    fn test_plan_from_records() {
        let mut session = TestSession::new("Support".into(), "Ira".into(), "You help.".into());
        session.goal = Some("Resolve the issue".into());
        session.max_turns = 8;
        let case = TestCase {
            scenario: "Payment failed twice".into(),
            persona_name: "Ravi".into(),
            agent_speaks_first: false,
            ..TestCase::new(session.id.clone(), "UPI".into(), "You are impatient.".into())
        };

        let plan = SimulationPlan::for_test_case("c".into(), &session, &case, "You are impatient.", None);
        assert_eq!(plan.max_turns, 8);
        assert_eq!(plan.goal.as_deref(), Some("Resolve the issue"));
        assert_eq!(plan.opening_speaker(), Speaker::Simulator);
        assert!(plan.simulator.system_prompt.contains("Scenario: Payment failed twice"));
        assert!(plan.simulator.system_prompt.starts_with("You are a helpful AI assistant named Ravi."));
    }
}
