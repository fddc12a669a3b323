use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{conversation_turn::ConversationTurn, evaluation::Evaluation, score::Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationSource {
    Simulated,
    Imported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    GoalMet,
    MaxTurns,
    TimeLimit,
    StoppedByUser,
    Error,
}

impl EndReason {
    pub const fn status(self) -> ConversationStatus {
        match self {
            Self::GoalMet | Self::MaxTurns | Self::TimeLimit => ConversationStatus::Completed,
            Self::StoppedByUser => ConversationStatus::Stopped,
            Self::Error => ConversationStatus::Failed,
        }
    }
}

/// Per-turn response latency statistics, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub turn_count: usize,
    pub mean_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

stored_object!(Conversation, "conversation", {
    session_id: String,
    test_case_id: Option<String>,
    source: ConversationSource,
    status: ConversationStatus,
    end_reason: Option<EndReason>,
    goal_reasoning: Option<String>,
    metrics: Option<LatencySummary>,
    agent_name: String,
    persona_name: String
});

impl Conversation {
    fn with_source(
        session_id: String,
        test_case_id: Option<String>,
        source: ConversationSource,
        status: ConversationStatus,
        agent_name: String,
        persona_name: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            session_id,
            test_case_id,
            source,
            status,
            end_reason: None,
            goal_reasoning: None,
            metrics: None,
            agent_name,
            persona_name,
        }
    }

    pub fn new_simulated(
        session_id: String,
        test_case_id: String,
        agent_name: String,
        persona_name: String,
    ) -> Self {
        Self::with_source(
            session_id,
            Some(test_case_id),
            ConversationSource::Simulated,
            ConversationStatus::Running,
            agent_name,
            persona_name,
        )
    }

    pub fn new_imported(session_id: String, agent_name: String, persona_name: String) -> Self {
        Self::with_source(
            session_id,
            None,
            ConversationSource::Imported,
            ConversationStatus::Completed,
            agent_name,
            persona_name,
        )
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Conversation {id} not found")))
    }

    pub async fn list_for_session(
        session_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        Ok(db.find_by_field("session_id", session_id).await?)
    }

    pub async fn get_with_turns(
        id: &str,
        db: &SurrealDbClient,
    ) -> Result<(Self, Vec<ConversationTurn>), AppError> {
        let conversation = Self::get(id, db).await?;
        let turns = ConversationTurn::list_for_conversation(id, db).await?;
        Ok((conversation, turns))
    }

    /// Records how a simulation ended.
    pub async fn finish(
        id: &str,
        end_reason: EndReason,
        goal_reasoning: Option<String>,
        metrics: LatencySummary,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", end_reason.status()))
            .patch(PatchOp::replace("/end_reason", end_reason))
            .patch(PatchOp::replace("/goal_reasoning", goal_reasoning))
            .patch(PatchOp::replace("/metrics", metrics))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    /// Deletes the conversation with its turns, evaluations and scores.
    pub async fn delete_with_children(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.delete_by_field::<ConversationTurn>("conversation_id", id)
            .await?;
        db.delete_by_field::<Score>("conversation_id", id).await?;
        db.delete_by_field::<Evaluation>("conversation_id", id)
            .await?;
        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}
