use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The agent under test.
    Agent,
    /// The persona-driven simulated user.
    Simulator,
}

stored_object!(ConversationTurn, "conversation_turn", {
    conversation_id: String,
    turn_index: u32,
    speaker: Speaker,
    speaker_name: String,
    content: String,
    latency_ms: u64,
    #[serde(serialize_with = "serialize_record_datetime", deserialize_with = "deserialize_record_datetime")]
    occurred_at: DateTime<Utc>
});

impl ConversationTurn {
    pub fn new(
        conversation_id: String,
        turn_index: u32,
        speaker: Speaker,
        speaker_name: String,
        content: String,
        latency_ms: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            conversation_id,
            turn_index,
            speaker,
            speaker_name,
            content,
            latency_ms,
            occurred_at: now,
        }
    }

    pub async fn list_for_conversation(
        conversation_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let turns: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table_name) WHERE conversation_id = $conversation_id ORDER BY turn_index ASC")
            .bind(("table_name", Self::table_name()))
            .bind(("conversation_id", conversation_id.to_string()))
            .await?
            .take(0)?;
        Ok(turns)
    }

    /// `Speaker: message` line used in judge prompts and transcripts.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.speaker_name, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_turns_are_listed_by_index() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let second = ConversationTurn::new(
            "c1".into(),
            1,
            Speaker::Simulator,
            "Caller".into(),
            "My kettle broke".into(),
            40,
        );
        let first = ConversationTurn::new(
            "c1".into(),
            0,
            Speaker::Agent,
            "Support".into(),
            "How can I help?".into(),
            25,
        );
        db.store_item(second).await.unwrap();
        db.store_item(first).await.unwrap();

        let turns = ConversationTurn::list_for_conversation("c1", &db)
            .await
            .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, Speaker::Agent);
        assert_eq!(turns[1].transcript_line(), "Caller: My kettle broke");
    }
}
