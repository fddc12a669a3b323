use surrealdb::opt::PatchOp;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{
    conversation::Conversation, evaluation::Evaluation, score::Score,
    scoring_metric::ScoringMetric, test_case::TestCase,
};

pub const DEFAULT_MAX_TURNS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Draft,
    Running,
    Completed,
    Failed,
}

stored_object!(TestSession, "test_session", {
    name: String,
    description: String,
    agent_name: String,
    /// System prompt of the agent under test.
    agent_prompt: String,
    goal: Option<String>,
    max_turns: u32,
    allow_interruptions: bool,
    status: SessionStatus
});

impl TestSession {
    pub fn new(name: String, agent_name: String, agent_prompt: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
            description: String::new(),
            agent_name,
            agent_prompt,
            goal: None,
            max_turns: DEFAULT_MAX_TURNS,
            allow_interruptions: false,
            status: SessionStatus::Draft,
        }
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test session {id} not found")))
    }

    pub async fn list_newest_first(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let sessions: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table_name) ORDER BY created_at DESC")
            .bind(("table_name", Self::table_name()))
            .await?
            .take(0)?;
        Ok(sessions)
    }

    pub async fn set_status(
        id: &str,
        status: SessionStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/status", status))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    /// Removes the session together with its test cases, metrics,
    /// conversations (and their turns), evaluations and scores.
    pub async fn delete_cascade(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let session = Self::get(id, db).await?;

        let conversations = Conversation::list_for_session(id, db).await?;
        for conversation in &conversations {
            Conversation::delete_with_children(&conversation.id, db).await?;
        }

        db.delete_by_field::<Score>("session_id", id).await?;
        db.delete_by_field::<Evaluation>("session_id", id).await?;
        db.delete_by_field::<ScoringMetric>("session_id", id).await?;
        db.delete_by_field::<TestCase>("session_id", id).await?;
        db.delete_item::<Self>(id).await?;

        info!(
            session_id = %session.id,
            conversations = conversations.len(),
            "Deleted test session and its children"
        );
        Ok(())
    }
}
