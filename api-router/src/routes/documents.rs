use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::{
    error::AppError,
    storage::types::document::{Document, DocumentSummary},
    utils::ingest_limits::validate_document_input,
};
use rag_pipeline::{extraction::extract_text, NewDocument, RetrievedChunk};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use common::utils::validation;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct DocumentUpload {
    pub title: Option<String>,
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

#[derive(Debug, Deserialize)]
pub struct TextDocumentRequest {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub document_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RetrievedChunk>,
}

pub async fn list_documents(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let documents = Document::list_newest_first(&state.db).await?;
    let summaries: Vec<DocumentSummary> = documents.iter().map(DocumentSummary::from).collect();
    Ok(Json(summaries))
}

pub async fn upload_document(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<DocumentUpload>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input.file.metadata.file_name.clone();
    let content_type = input.file.metadata.content_type.clone();
    let title = validation::optional_text(input.title)
        .or_else(|| file_name.clone())
        .unwrap_or_default();

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::from)?;
    validate_document_input(&state.config, &title, bytes.len())?;

    info!(
        file_name = file_name.as_deref().unwrap_or("unnamed"),
        bytes = bytes.len(),
        "Received document upload"
    );

    let extracted = extract_text(bytes, content_type.as_deref(), file_name.as_deref()).await?;
    let document = state
        .documents
        .ingest(NewDocument {
            title: title.trim().to_string(),
            file_name,
            content_type: extracted.content_type,
            text: extracted.text,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DocumentSummary::from(&document))))
}

pub async fn create_text_document(
    State(state): State<ApiState>,
    Json(input): Json<TextDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_document_input(&state.config, &input.title, input.text.trim().len())?;

    let content_type = input
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("text/plain");
    let extracted = extract_text(
        input.text.into_bytes(),
        Some(content_type),
        input.file_name.as_deref(),
    )
    .await?;

    let document = state
        .documents
        .ingest(NewDocument {
            title: input.title.trim().to_string(),
            file_name: input.file_name,
            content_type: extracted.content_type,
            text: extracted.text,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DocumentSummary::from(&document))))
}

pub async fn get_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(Document::get(&id, &state.db).await?))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.documents.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reindex_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.documents.reindex(&id).await?;
    Ok(Json(DocumentSummary::from(&document)))
}

pub async fn search_documents(
    State(state): State<ApiState>,
    Json(input): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = validation::required_text("query", &input.query)?;
    let top_k = validation::top_k(input.top_k, state.config.retrieval_top_k)?;

    let results = state
        .documents
        .search(&query, top_k, input.document_ids.as_deref())
        .await?;

    Ok(Json(SearchResponse { query, results }))
}
