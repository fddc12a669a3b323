use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::{
    error::AppError,
    storage::types::document::Document,
    utils::{ingest_limits::validate_document_input, validation},
};
use rag_pipeline::{extraction::extract_text, NewDocument, RagAnswer, RetrievedChunk};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{
    html_state::HtmlState,
    middlewares::response_middleware::{HtmlError, TemplateResponse},
    utils::text_content_preview::preview,
};

#[derive(Serialize)]
pub struct DocumentItem {
    id: String,
    title: String,
    file_name: Option<String>,
    content_type: String,
    chunk_count: usize,
    preview: String,
    created_at: String,
}

impl From<&Document> for DocumentItem {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.clone(),
            title: document.title.clone(),
            file_name: document.file_name.clone(),
            content_type: document.content_type.clone(),
            chunk_count: document.chunk_count,
            preview: preview(&document.text),
            created_at: document.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentsQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub ask: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentsPageData {
    documents: Vec<DocumentItem>,
    query: Option<String>,
    results: Vec<RetrievedChunk>,
    question: Option<String>,
    answer: Option<RagAnswer>,
}

/// Lists documents; `?q=` runs a similarity search and `?ask=` answers a
/// question from the retrieved chunks.
pub async fn show_documents(
    State(state): State<HtmlState>,
    Query(params): Query<DocumentsQuery>,
) -> Result<impl IntoResponse, HtmlError> {
    let documents = Document::list_newest_first(&state.db).await?;
    let top_k = state.config.retrieval_top_k;

    let query = validation::optional_text(params.q);
    let results = match &query {
        Some(query) => state.documents.search(query, top_k, None).await?,
        None => Vec::new(),
    };

    let question = validation::optional_text(params.ask);
    let answer = match &question {
        Some(question) => Some(state.documents.answer(question, top_k).await?),
        None => None,
    };

    Ok(TemplateResponse::new_template(
        "documents/list.html",
        DocumentsPageData {
            documents: documents.iter().map(DocumentItem::from).collect(),
            query,
            results,
            question,
            answer,
        },
    ))
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub title: Option<String>,
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

pub async fn upload_document(
    State(state): State<HtmlState>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, HtmlError> {
    let file_name = input.file.metadata.file_name.clone();
    let content_type = input.file.metadata.content_type.clone();
    let title = validation::optional_text(input.title)
        .or_else(|| file_name.clone())
        .unwrap_or_default();

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::from)?;
    validate_document_input(&state.config, &title, bytes.len())?;

    let extracted = extract_text(bytes, content_type.as_deref(), file_name.as_deref()).await?;
    let document = state
        .documents
        .ingest(NewDocument {
            title,
            file_name,
            content_type: extracted.content_type,
            text: extracted.text,
        })
        .await?;
    info!(document_id = %document.id, "Uploaded document from UI");

    Ok(TemplateResponse::redirect("/documents"))
}

pub async fn delete_document(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    Document::get(&id, &state.db).await?;
    state.documents.delete(&id).await?;
    Ok(TemplateResponse::redirect("/documents"))
}
