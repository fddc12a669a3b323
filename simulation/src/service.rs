use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            conversation::{Conversation, EndReason},
            conversation_turn::ConversationTurn,
            test_case::TestCase,
            test_session::{SessionStatus, TestSession},
        },
    },
    utils::config::AppConfig,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    persona::PersonaLibrary,
    registry::SimulationRegistry,
    runner::{SimulationPlan, SimulationRunner},
    transcript::{simplify, to_turns, unify, BotTranscript},
};

pub struct SimulationHandle {
    pub conversation: Conversation,
    pub task: JoinHandle<()>,
}

/// Starts simulations in the background and keeps their stop flags.
#[derive(Clone)]
pub struct SimulationLauncher {
    db: Arc<SurrealDbClient>,
    runner: Arc<SimulationRunner>,
    registry: SimulationRegistry,
    personas: Arc<PersonaLibrary>,
    max_duration: Option<Duration>,
}

impl SimulationLauncher {
    pub fn new(
        db: Arc<SurrealDbClient>,
        runner: Arc<SimulationRunner>,
        registry: SimulationRegistry,
        personas: Arc<PersonaLibrary>,
        max_duration: Option<Duration>,
    ) -> Self {
        Self {
            db,
            runner,
            registry,
            personas,
            max_duration,
        }
    }

    /// A zero `simulation_max_seconds` disables the time limit.
    pub fn max_duration_from_config(config: &AppConfig) -> Option<Duration> {
        (config.simulation_max_seconds > 0)
            .then(|| Duration::from_secs(config.simulation_max_seconds))
    }

    pub fn registry(&self) -> &SimulationRegistry {
        &self.registry
    }

    pub async fn start(
        &self,
        test_case_id: &str,
        model: Option<String>,
    ) -> Result<SimulationHandle, AppError> {
        let test_case = TestCase::get(test_case_id, &self.db).await?;
        let session = TestSession::get(&test_case.session_id, &self.db).await?;

        let persona_prompt = if test_case.persona_prompt.trim().is_empty() {
            self.personas.random_prompt()
        } else {
            test_case.persona_prompt.clone()
        };

        let conversation = Conversation::new_simulated(
            session.id.clone(),
            test_case.id.clone(),
            session.agent_name.clone(),
            test_case.persona_name.clone(),
        );
        self.db.store_item(conversation.clone()).await?;
        // Registered before the status write so a sibling run finishing now
        // does not settle the session.
        let ticket = self.registry.register(&conversation.id, &session.id);
        TestSession::set_status(&session.id, SessionStatus::Running, &self.db).await?;

        let mut plan = SimulationPlan::for_test_case(
            conversation.id.clone(),
            &session,
            &test_case,
            &persona_prompt,
            self.max_duration,
        );
        plan.model = model.filter(|m| !m.trim().is_empty());

        let runner = Arc::clone(&self.runner);
        let registry = self.registry.clone();
        let db = Arc::clone(&self.db);
        let session_id = session.id.clone();

        info!(
            conversation_id = %conversation.id,
            test_case_id,
            session_id = %session_id,
            "Launching simulation"
        );

        let task = tokio::spawn(async move {
            let failed = match runner.run(&plan, ticket.stop_flag()).await {
                Ok(outcome) => outcome.end_reason == EndReason::Error,
                Err(err) => {
                    error!(conversation_id = %plan.conversation_id, error = %err, "Simulation aborted");
                    true
                }
            };
            if let Some(status) = registry.finish(&plan.conversation_id, failed) {
                if let Err(err) = TestSession::set_status(&session_id, status, &db).await {
                    warn!(session_id, error = %err, "Failed to update session status");
                }
            }
            drop(ticket);
        });

        Ok(SimulationHandle { conversation, task })
    }

    pub fn stop(&self, conversation_id: &str) -> bool {
        self.registry.stop(conversation_id)
    }

    /// Stops the run and waits for its task to exit. Callers deleting a
    /// conversation use this so no turn is written after the delete.
    pub async fn stop_and_wait(&self, conversation_id: &str) {
        self.registry.stop(conversation_id);
        self.registry.wait_for_exit(conversation_id).await;
    }
}

/// Stores two externally recorded bot transcripts as one imported
/// conversation. Bot 1 is taken to be the agent under test.
pub async fn import_transcripts(
    db: &SurrealDbClient,
    session_id: &str,
    bot1: &BotTranscript,
    bot2: &BotTranscript,
) -> Result<(Conversation, Vec<ConversationTurn>), AppError> {
    let session = TestSession::get(session_id, db).await?;

    let conversation = Conversation::new_imported(
        session.id.clone(),
        bot1.bot_name.clone(),
        bot2.bot_name.clone(),
    );
    let turns = to_turns(&simplify(&unify(bot1, bot2)), &conversation.id);
    if turns.is_empty() {
        return Err(AppError::Validation(
            "Transcripts contain no conversation messages".into(),
        ));
    }

    db.store_item(conversation.clone()).await?;
    for turn in &turns {
        db.store_item(turn.clone()).await?;
    }

    info!(
        conversation_id = %conversation.id,
        session_id,
        turns = turns.len(),
        "Imported conversation transcript"
    );
    Ok((conversation, turns))
}

#[cfg(test)]
mod tests {
    use common::{
        storage::types::{conversation::ConversationStatus, conversation_turn::Speaker},
        utils::llm::ScriptedLanguageModel,
    };
    use uuid::Uuid;

    use super::*;
    use crate::transcript::TranscriptEntry;

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    async fn seeded(db: &SurrealDbClient, max_turns: u32) -> (TestSession, TestCase) {
        let session = TestSession::new("Support".into(), "Ira".into(), "You help.".into());
        db.store_item(session.clone()).await.unwrap();
        let case = TestCase {
            max_turns: Some(max_turns),
            ..TestCase::new(session.id.clone(), "Refund".into(), String::new())
        };
        db.store_item(case.clone()).await.unwrap();
        (session, case)
    }

    fn launcher(db: &Arc<SurrealDbClient>, model: ScriptedLanguageModel) -> SimulationLauncher {
        let runner = SimulationRunner::new(Arc::clone(db), Arc::new(model));
        SimulationLauncher::new(
            Arc::clone(db),
            Arc::new(runner),
            SimulationRegistry::new(),
            Arc::new(PersonaLibrary::default()),
            None,
        )
    }

    #[tokio::test]
    async fn test_start_runs_in_background() {
        let db = memory_db().await;
        let (session, case) = seeded(&db, 2).await;
        let launcher = launcher(&db, ScriptedLanguageModel::new(["Hi", "Hello"]));

        let handle = launcher.start(&case.id, None).await.unwrap();
        assert_eq!(handle.conversation.status, ConversationStatus::Running);
        handle.task.await.unwrap();

        let (conversation, turns) = Conversation::get_with_turns(&handle.conversation.id, &db)
            .await
            .unwrap();
        assert_eq!(conversation.status, ConversationStatus::Completed);
        assert_eq!(conversation.end_reason, Some(EndReason::MaxTurns));
        assert_eq!(turns.len(), 2);
        assert!(!launcher.registry().is_running(&conversation.id));

        let session = TestSession::get(&session.id, &db).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_session_stays_running_until_last_simulation_ends() {
        let db = memory_db().await;
        let (session, long_case) = seeded(&db, 10).await;
        let short_case = TestCase {
            max_turns: Some(1),
            ..TestCase::new(session.id.clone(), "Quick".into(), String::new())
        };
        db.store_item(short_case.clone()).await.unwrap();
        let launcher = launcher(
            &db,
            ScriptedLanguageModel::default()
                .with_fallback("Okay.")
                .with_delay(Duration::from_millis(20)),
        );

        let long = launcher.start(&long_case.id, None).await.unwrap();
        let short = launcher.start(&short_case.id, None).await.unwrap();
        short.task.await.unwrap();

        assert!(launcher.registry().is_running(&long.conversation.id));
        let status = TestSession::get(&session.id, &db).await.unwrap().status;
        assert_eq!(status, SessionStatus::Running);

        assert!(launcher.stop(&long.conversation.id));
        long.task.await.unwrap();
        let status = TestSession::get(&session.id, &db).await.unwrap().status;
        assert_eq!(status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_during_run_leaves_no_turns() {
        let db = memory_db().await;
        let (_, case) = seeded(&db, 10).await;
        let launcher = launcher(
            &db,
            ScriptedLanguageModel::default()
                .with_fallback("Still here.")
                .with_delay(Duration::from_millis(100)),
        );

        let handle = launcher.start(&case.id, None).await.unwrap();
        let conversation_id = handle.conversation.id.clone();
        tokio::time::sleep(Duration::from_millis(30)).await;

        launcher.stop_and_wait(&conversation_id).await;
        assert!(!launcher.registry().is_running(&conversation_id));
        Conversation::delete_with_children(&conversation_id, &db)
            .await
            .unwrap();
        handle.task.await.unwrap();

        let turns = ConversationTurn::list_for_conversation(&conversation_id, &db)
            .await
            .unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn test_empty_persona_prompt_uses_default() {
        let db = memory_db().await;
        let (_, case) = seeded(&db, 1).await;
        let model = Arc::new(ScriptedLanguageModel::new(["Hi"]));
        let runner = SimulationRunner::new(Arc::clone(&db), model.clone());
        let launcher = SimulationLauncher::new(
            Arc::clone(&db),
            Arc::new(runner),
            SimulationRegistry::new(),
            Arc::new(PersonaLibrary::default()),
            None,
        );
        let mut case = case;
        case.agent_speaks_first = false;
        db.update_item(case.clone()).await.unwrap();

        launcher.start(&case.id, None).await.unwrap().task.await.unwrap();

        let system_prompt = &model.requests()[0].turns[0].content;
        assert!(system_prompt.contains(crate::persona::DEFAULT_PERSONA_PROMPT));
    }

    #[tokio::test]
    async fn test_start_missing_test_case() {
        let db = memory_db().await;
        let launcher = launcher(&db, ScriptedLanguageModel::default());
        assert!(matches!(
            launcher.start("missing", None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_transcripts() {
        let db = memory_db().await;
        let (session, _) = seeded(&db, 2).await;
        let bot1 = BotTranscript {
            bot_name: "Ira".into(),
            start_time: None,
            end_time: None,
            entries: vec![TranscriptEntry {
                timestamp: "2025-01-01 10:00:01".into(),
                speaker: "Ira".into(),
                text: "How can I help?".into(),
                entry_type: "response".into(),
            }],
        };
        let bot2 = BotTranscript {
            bot_name: "Caller".into(),
            start_time: None,
            end_time: None,
            entries: vec![TranscriptEntry {
                timestamp: "2025-01-01 10:00:04".into(),
                speaker: "Caller".into(),
                text: "Refund please.".into(),
                entry_type: "response".into(),
            }],
        };

        let (conversation, turns) = import_transcripts(&db, &session.id, &bot1, &bot2)
            .await
            .unwrap();
        assert_eq!(conversation.agent_name, "Ira");
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].speaker, Speaker::Simulator);

        let stored = ConversationTurn::list_for_conversation(&conversation.id, &db)
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);

        let empty = BotTranscript {
            entries: Vec::new(),
            ..bot2.clone()
        };
        let result = import_transcripts(
            &db,
            &session.id,
            &BotTranscript {
                entries: Vec::new(),
                ..bot1
            },
            &empty,
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(matches!(
            import_transcripts(&db, "missing", &empty, &bot2).await,
            Err(AppError::NotFound(_))
        ));
    }
}
