use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::score::ScoringType;

stored_object!(ScoringMetric, "scoring_metric", {
    session_id: String,
    name: String,
    description: String,
    scoring_type: ScoringType,
    instructions: String,
    weight: f64
});

impl ScoringMetric {
    pub fn new(
        session_id: String,
        name: String,
        description: String,
        scoring_type: ScoringType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            session_id,
            name,
            description,
            scoring_type,
            instructions: String::new(),
            weight: 1.0,
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
            .ok_or_else(|| AppError::NotFound(format!("Scoring metric {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_for_session_in_creation_order() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let first = ScoringMetric::new(
            "s1".into(),
            "Empathy".into(),
            "Acknowledges the caller's feelings".into(),
            ScoringType::Scale,
        );
        let mut second = ScoringMetric::new(
            "s1".into(),
            "Resolved".into(),
            "The issue was resolved".into(),
            ScoringType::Boolean,
        );
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let other = ScoringMetric::new(
            "s2".into(),
            "Other".into(),
            "Other".into(),
            ScoringType::Scale,
        );

        db.store_item(second.clone()).await.unwrap();
        db.store_item(first.clone()).await.unwrap();
        db.store_item(other).await.unwrap();

        let metrics = ScoringMetric::list_for_session("s1", &db).await.unwrap();
        let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Empathy", "Resolved"]);
        assert_eq!(metrics[1].scoring_type, ScoringType::Boolean);
        assert!((metrics[0].weight - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_get_missing_metric() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let result = ScoringMetric::get("nope", &db).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
