use std::{collections::HashMap, sync::Arc};

use common::{
    error::AppError,
    storage::{
        db::{is_index_violation, SurrealDbClient, DOCUMENT_HASH_INDEX},
        types::{document::Document, document_chunk::DocumentChunk},
    },
    utils::{
        embedding::EmbeddingProvider,
        llm::{ChatTurn, CompletionRequest, LanguageModel},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    chunking::{split_text, ChunkSettings, TextFormat},
    similarity::rank_chunks,
};

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using only the provided context. \
If the context does not contain the answer, say that you do not know. Cite passages by their [n] marker when you use them.";

const NO_CONTEXT_NOTICE: &str = "No documents matched the question.";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub file_name: Option<String>,
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub document_title: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub question: String,
    pub answer: String,
    pub model: String,
    pub contexts: Vec<RetrievedChunk>,
}

/// Chunk, embed, persist and search documents.
pub struct DocumentPipeline {
    db: Arc<SurrealDbClient>,
    embeddings: Arc<EmbeddingProvider>,
    language_model: Arc<dyn LanguageModel>,
    chunk_settings: ChunkSettings,
    generation_model: Option<String>,
}

impl DocumentPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        embeddings: Arc<EmbeddingProvider>,
        language_model: Arc<dyn LanguageModel>,
        chunk_settings: ChunkSettings,
    ) -> Result<Self, AppError> {
        chunk_settings.validate()?;
        Ok(Self {
            db,
            embeddings,
            language_model,
            chunk_settings,
            generation_model: None,
        })
    }

    #[must_use]
    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = Some(model.into());
        self
    }

    pub fn language_model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.language_model)
    }

    pub async fn ingest(&self, new_document: NewDocument) -> Result<Document, AppError> {
        if new_document.text.trim().is_empty() {
            return Err(AppError::Validation(
                "Document contains no extractable text".into(),
            ));
        }

        let mut document = Document::new(
            new_document.title.trim().to_string(),
            new_document.file_name,
            new_document.content_type,
            new_document.text,
        );

        if let Some(existing) = Document::find_by_hash(&document.content_hash, &self.db).await? {
            return Err(AppError::Conflict(format!(
                "An identical document already exists: {}",
                existing.id
            )));
        }

        let chunks = self.build_chunks(&document).await?;
        document.chunk_count = chunks.len();
        document.embedding_model = self.embeddings.model_code();

        self.store_document(&document).await?;
        for chunk in chunks {
            self.db.store_item(chunk).await?;
        }

        info!(
            document_id = %document.id,
            chunks = document.chunk_count,
            model = %document.embedding_model,
            "Ingested document"
        );
        Ok(document)
    }

    /// A concurrent upload of the same content can pass the hash lookup; the
    /// unique hash index then rejects the second write.
    async fn store_document(&self, document: &Document) -> Result<(), AppError> {
        match self.db.store_item(document.clone()).await {
            Ok(_) => Ok(()),
            Err(err) if is_index_violation(&err, DOCUMENT_HASH_INDEX) => Err(AppError::Conflict(format!(
                "An identical document already exists: {}",
                document.content_hash
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Re-chunks and re-embeds a stored document with the current settings.
    pub async fn reindex(&self, document_id: &str) -> Result<Document, AppError> {
        let mut document = Document::get(document_id, &self.db).await?;
        let chunks = self.build_chunks(&document).await?;

        DocumentChunk::delete_for_document(document_id, &self.db).await?;
        document.chunk_count = chunks.len();
        document.embedding_model = self.embeddings.model_code();
        for chunk in chunks {
            self.db.store_item(chunk).await?;
        }
        Document::set_index_info(
            document_id,
            document.chunk_count,
            &document.embedding_model,
            &self.db,
        )
        .await?;

        info!(
            document_id,
            chunks = document.chunk_count,
            "Reindexed document"
        );
        Ok(document)
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("Search query must not be empty".into()));
        }
        if top_k == 0 {
            return Err(AppError::Validation("top_k must be at least 1".into()));
        }

        let query_embedding = self.embeddings.embed(query).await?;
        let chunks = DocumentChunk::list_for_documents(document_ids, &self.db).await?;
        let ranked = rank_chunks(&query_embedding, &chunks, top_k);

        let mut titles: HashMap<String, String> = HashMap::new();
        let mut results = Vec::with_capacity(ranked.len());
        for (chunk, score) in ranked {
            if !titles.contains_key(&chunk.document_id) {
                let title = self
                    .db
                    .get_item::<Document>(&chunk.document_id)
                    .await?
                    .map(|d| d.title)
                    .unwrap_or_default();
                titles.insert(chunk.document_id.clone(), title);
            }

            results.push(RetrievedChunk {
                document_id: chunk.document_id.clone(),
                document_title: titles
                    .get(&chunk.document_id)
                    .cloned()
                    .unwrap_or_default(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                score,
            });
        }

        debug!(
            candidates = chunks.len(),
            returned = results.len(),
            "Ranked document chunks"
        );
        Ok(results)
    }

    /// Retrieves context for `question` and generates a grounded answer.
    pub async fn answer(&self, question: &str, top_k: usize) -> Result<RagAnswer, AppError> {
        let contexts = self.search(question, top_k, None).await?;

        let request = CompletionRequest {
            model: self.generation_model.clone(),
            turns: vec![
                ChatTurn::system(ANSWER_SYSTEM_PROMPT),
                ChatTurn::user(build_answer_prompt(question, &contexts)),
            ],
            temperature: Some(0.2),
            json_output: false,
        };
        let completion = self.language_model.complete(request).await?;

        Ok(RagAnswer {
            question: question.to_string(),
            answer: completion.text.trim().to_string(),
            model: completion.model,
            contexts,
        })
    }

    pub async fn delete(&self, document_id: &str) -> Result<(), AppError> {
        Document::delete_with_chunks(document_id, &self.db).await?;
        info!(document_id, "Deleted document");
        Ok(())
    }

    async fn build_chunks(&self, document: &Document) -> Result<Vec<DocumentChunk>, AppError> {
        let format = TextFormat::from_content_type(&document.content_type);
        let texts = split_text(&document.text, format, self.chunk_settings)?;
        let embeddings = self.embeddings.embed_batch(texts.clone()).await?;

        if embeddings.len() != texts.len() {
            return Err(AppError::Processing(format!(
                "embedding backend returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (text, embedding))| {
                DocumentChunk::new(document.id.clone(), index, text, embedding)
            })
            .collect())
    }
}

fn build_answer_prompt(question: &str, contexts: &[RetrievedChunk]) -> String {
    if contexts.is_empty() {
        return format!("Context:\n{NO_CONTEXT_NOTICE}\n\nQuestion: {question}");
    }

    let context = contexts
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[{}] ({})\n{}", i + 1, chunk.document_title, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Context:\n{context}\n\nQuestion: {question}")
}

#[cfg(test)]
mod tests {
    use common::utils::llm::ScriptedLanguageModel;
    use uuid::Uuid;

    use super::*;

    async fn pipeline_with(model: Arc<ScriptedLanguageModel>) -> DocumentPipeline {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized().await.unwrap();

        DocumentPipeline::new(
            Arc::new(db),
            Arc::new(EmbeddingProvider::new_hashed(128)),
            model,
            ChunkSettings {
                min_chars: 40,
                max_chars: 120,
                overlap_chars: 10,
            },
        )
        .unwrap()
    }

    fn text_document(title: &str, text: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            file_name: None,
            content_type: "text/plain".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_persists_chunks() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let text = "Refunds are issued within five business days. ".repeat(6);

        let document = pipeline
            .ingest(text_document("Refund policy", &text))
            .await
            .unwrap();

        assert!(document.chunk_count > 1);
        assert_eq!(document.embedding_model, "hashed-128");
        let chunks = DocumentChunk::list_for_document(&document.id, &pipeline.db)
            .await
            .unwrap();
        assert_eq!(chunks.len(), document.chunk_count);
        assert!(chunks.iter().all(|c| c.embedding.len() == 128));
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_duplicate_ingest_conflicts() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        pipeline
            .ingest(text_document("A", "Same content"))
            .await
            .unwrap();

        let result = pipeline.ingest(text_document("B", "Same content")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_hash_index_violation_is_a_conflict() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let first = Document::new(
            "A".into(),
            None,
            "text/plain".into(),
            "Same content".into(),
        );
        pipeline.store_document(&first).await.unwrap();

        // Same hash, new id: only the unique index can catch this one.
        let second = Document::new(
            "B".into(),
            None,
            "text/plain".into(),
            "Same content".into(),
        );
        let result = pipeline.store_document(&second).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_uploads() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let (a, b) = tokio::join!(
            pipeline.ingest(text_document("A", "Racing content")),
            pipeline.ingest(text_document("B", "Racing content")),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::Conflict(_)))));
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let result = pipeline.ingest(text_document("Empty", "   ")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_chunk_first() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let shipping = pipeline
            .ingest(text_document(
                "Shipping",
                "Parcels ship by courier within two days",
            ))
            .await
            .unwrap();
        pipeline
            .ingest(text_document(
                "Warranty",
                "Kettles carry a warranty of one year",
            ))
            .await
            .unwrap();

        let results = pipeline
            .search("how fast do parcels ship", 2, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, shipping.id);
        assert_eq!(results[0].document_title, "Shipping");
        assert!(results[0].score > results[1].score);

        let filtered = pipeline
            .search("kettle warranty", 5, Some(&[shipping.id.clone()]))
            .await
            .unwrap();
        assert!(filtered.iter().all(|r| r.document_id == shipping.id));
    }

    #[tokio::test]
    async fn test_search_validates_input() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        assert!(matches!(
            pipeline.search("  ", 3, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            pipeline.search("query", 0, None).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_includes_context_in_prompt() {
        let model = Arc::new(ScriptedLanguageModel::new(["Within two days."]));
        let pipeline = pipeline_with(Arc::clone(&model)).await;
        pipeline
            .ingest(text_document(
                "Shipping",
                "Parcels ship by courier within two days",
            ))
            .await
            .unwrap();

        let answer = pipeline.answer("When do parcels ship?", 3).await.unwrap();
        assert_eq!(answer.answer, "Within two days.");
        assert_eq!(answer.contexts.len(), 1);

        let requests = model.requests();
        let prompt = &requests[0].turns[1].content;
        assert!(prompt.contains("[1] (Shipping)"));
        assert!(prompt.contains("Question: When do parcels ship?"));
    }

    #[tokio::test]
    async fn test_answer_without_documents_still_asks_model() {
        let model = Arc::new(ScriptedLanguageModel::new(["I do not know."]));
        let pipeline = pipeline_with(Arc::clone(&model)).await;

        let answer = pipeline.answer("Anything?", 3).await.unwrap();
        assert!(answer.contexts.is_empty());
        assert!(model.requests()[0].turns[1].content.contains(NO_CONTEXT_NOTICE));
    }

    #[tokio::test]
    async fn test_reindex_and_delete() {
        let pipeline = pipeline_with(Arc::new(ScriptedLanguageModel::default())).await;
        let document = pipeline
            .ingest(text_document("Doc", "Short body of text"))
            .await
            .unwrap();

        let reindexed = pipeline.reindex(&document.id).await.unwrap();
        assert_eq!(reindexed.chunk_count, 1);
        let chunks = DocumentChunk::list_for_document(&document.id, &pipeline.db)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);

        pipeline.delete(&document.id).await.unwrap();
        assert!(matches!(
            Document::get(&document.id, &pipeline.db).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            pipeline.reindex(&document.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
