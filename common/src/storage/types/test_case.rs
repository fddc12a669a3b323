use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::test_session::TestSession;

stored_object!(TestCase, "test_case", {
    session_id: String,
    name: String,
    persona_name: String,
    persona_prompt: String,
    scenario: String,
    /// Overrides the session goal when set.
    goal: Option<String>,
    expected_outcome: String,
    /// Overrides the session turn limit when set.
    max_turns: Option<u32>,
    agent_speaks_first: bool
});

impl TestCase {
    pub fn new(session_id: String, name: String, persona_prompt: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            session_id,
            name,
            persona_name: "Simulated user".to_string(),
            persona_prompt,
            scenario: String::new(),
            goal: None,
            expected_outcome: String::new(),
            max_turns: None,
            agent_speaks_first: true,
        }
    }

    pub async fn list_for_session(
        session_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        Ok(db.find_by_field("session_id", session_id).await?)
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Test case {id} not found")))
    }

    pub fn effective_goal<'a>(&'a self, session: &'a TestSession) -> Option<&'a str> {
        self.goal
            .as_deref()
            .or(session.goal.as_deref())
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
    }

    pub fn effective_max_turns(&self, session: &TestSession) -> u32 {
        self.max_turns.unwrap_or(session.max_turns)
    }
}
