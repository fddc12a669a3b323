use sha2::{Digest, Sha256};
use surrealdb::opt::PatchOp;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::document_chunk::DocumentChunk;

stored_object!(Document, "document", {
    title: String,
    file_name: Option<String>,
    content_type: String,
    content_hash: String,
    text: String,
    chunk_count: usize,
    embedding_model: String
});

/// Lightweight listing row, without the document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub chunk_count: usize,
    pub embedding_model: String,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            file_name: document.file_name.clone(),
            content_type: document.content_type.clone(),
            chunk_count: document.chunk_count,
            embedding_model: document.embedding_model.clone(),
        }
    }
}

impl Document {
    pub fn new(
        title: String,
        file_name: Option<String>,
        content_type: String,
        text: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            file_name,
            content_type,
            content_hash: Self::hash_text(&text),
            text,
            chunk_count: 0,
            embedding_model: String::new(),
        }
    }

    /// Hex-encoded SHA-256 of the extracted text.
    pub fn hash_text(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        format!("{digest:x}")
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Self, AppError> {
        db.get_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
    }

    pub async fn find_by_hash(
        content_hash: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let found: Vec<Self> = db.find_by_field("content_hash", content_hash).await?;
        Ok(found.into_iter().next())
    }

    pub async fn list_newest_first(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let documents: Vec<Self> = db
            .client
            .query("SELECT * FROM type::table($table_name) ORDER BY created_at DESC")
            .bind(("table_name", Self::table_name()))
            .await?
            .take(0)?;
        Ok(documents)
    }

    pub async fn set_index_info(
        id: &str,
        chunk_count: usize,
        embedding_model: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let _updated: Option<Self> = db
            .update((Self::table_name(), id))
            .patch(PatchOp::replace("/chunk_count", chunk_count))
            .patch(PatchOp::replace(
                "/embedding_model",
                embedding_model.to_string(),
            ))
            .patch(PatchOp::replace(
                "/updated_at",
                surrealdb::Datetime::from(Utc::now()),
            ))
            .await?;
        Ok(())
    }

    pub async fn delete_with_chunks(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let deleted: Option<Self> = db.delete_item(id).await?;
        if deleted.is_none() {
            return Err(AppError::NotFound(format!("Document {id} not found")));
        }
        DocumentChunk::delete_for_document(id, db).await
    }
}
