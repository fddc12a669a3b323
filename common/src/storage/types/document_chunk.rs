use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(DocumentChunk, "document_chunk", {
    document_id: String,
    chunk_index: usize,
    text: String,
    embedding: Vec<f32>
});

impl DocumentChunk {
    pub fn new(document_id: String, chunk_index: usize, text: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            chunk_index,
            text,
            embedding,
        }
    }

    pub async fn list_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table_name) WHERE document_id = $document_id ORDER BY chunk_index ASC")
            .bind(("table_name", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;
        Ok(chunks)
    }

    /// Chunks of the given documents, or of every document when `None`.
    /// Ordered by document then position so ranking ties stay stable.
    pub async fn list_for_documents(
        document_ids: Option<&[String]>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = match document_ids {
            Some(ids) => db
                .client
                .query("SELECT * FROM type::table($table_name) WHERE document_id IN $document_ids ORDER BY document_id ASC, chunk_index ASC")
                .bind(("table_name", Self::table_name()))
                .bind(("document_ids", ids.to_vec()))
                .await?
                .take(0)?,
            None => db
                .client
                .query("SELECT * FROM type::table($table_name) ORDER BY document_id ASC, chunk_index ASC")
                .bind(("table_name", Self::table_name()))
                .await?
                .take(0)?,
        };
        Ok(chunks)
    }

    pub async fn delete_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.delete_by_field::<Self>("document_id", document_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_and_delete_chunks() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        for (doc, index) in [("a", 1), ("a", 0), ("b", 0)] {
            db.store_item(DocumentChunk::new(
                doc.into(),
                index,
                format!("{doc}-{index}"),
                vec![0.5, 0.5],
            ))
            .await
            .unwrap();
        }

        let a_chunks = DocumentChunk::list_for_document("a", &db).await.unwrap();
        let texts: Vec<_> = a_chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a-0", "a-1"]);
        assert_eq!(a_chunks[0].embedding, vec![0.5, 0.5]);

        let all = DocumentChunk::list_for_documents(None, &db).await.unwrap();
        assert_eq!(all.len(), 3);

        let only_b = DocumentChunk::list_for_documents(Some(&["b".to_string()]), &db)
            .await
            .unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].text, "b-0");

        DocumentChunk::delete_for_document("a", &db).await.unwrap();
        assert!(DocumentChunk::list_for_document("a", &db)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            DocumentChunk::list_for_documents(None, &db)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
