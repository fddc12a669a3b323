use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(RagEvaluation, "rag_evaluation", {
    question: String,
    answer: String,
    contexts: Vec<String>,
    ground_truth: Option<String>,
    faithfulness: Option<f64>,
    answer_relevancy: Option<f64>,
    context_precision: Option<f64>,
    context_recall: Option<f64>,
    overall_score: Option<f64>,
    model: String
});

impl RagEvaluation {
    pub fn new(
        question: String,
        answer: String,
        contexts: Vec<String>,
        ground_truth: Option<String>,
        model: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            question,
            answer,
            contexts,
            ground_truth,
            faithfulness: None,
            answer_relevancy: None,
            context_precision: None,
            context_recall: None,
            overall_score: None,
            model,
        }
    }

    pub async fn list_newest_first(
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let evaluations: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table_name) ORDER BY created_at DESC LIMIT $limit")
            .bind(("table_name", Self::table_name()))
            .bind(("limit", limit))
            .await?
            .take(0)?;
        Ok(evaluations)
    }
}
