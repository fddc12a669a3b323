use common::error::AppError;
use tracing::debug;

use crate::chunking::TextFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub content_type: String,
    pub format: TextFormat,
}

/// Resolves the effective content type, falling back to the file extension
/// when the client sent nothing useful.
pub fn resolve_content_type(content_type: Option<&str>, file_name: Option<&str>) -> String {
    let declared = content_type
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    if let Some(declared) = declared {
        return declared;
    }

    file_name
        .and_then(|name| mime_guess::from_path(name).first())
        .map_or_else(
            || "application/octet-stream".to_string(),
            |mime| mime.essence_str().to_string(),
        )
}

pub async fn extract_text(
    bytes: Vec<u8>,
    content_type: Option<&str>,
    file_name: Option<&str>,
) -> Result<ExtractedText, AppError> {
    let content_type = resolve_content_type(content_type, file_name);
    debug!(%content_type, bytes = bytes.len(), "Extracting document text");

    let text = match content_type.as_str() {
        "text/plain" | "text/markdown" | "text/x-markdown" => decode_utf8(bytes)?,
        "application/json" => {
            let value: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Validation(format!("Invalid JSON document: {e}")))?;
            serde_json::to_string_pretty(&value)?
        }
        "application/pdf" => extract_pdf_text(bytes).await?,
        other => {
            return Err(AppError::Validation(format!(
                "Unsupported document type '{other}'. Upload text, Markdown, JSON or PDF."
            )))
        }
    };

    Ok(ExtractedText {
        format: TextFormat::from_content_type(&content_type),
        text: text.trim().to_string(),
        content_type,
    })
}

fn decode_utf8(bytes: Vec<u8>) -> Result<String, AppError> {
    String::from_utf8(bytes)
        .map_err(|_| AppError::Validation("Document is not valid UTF-8 text".into()))
}

async fn extract_pdf_text(bytes: Vec<u8>) -> Result<String, AppError> {
    // pdf-extract panics on some malformed files; the join error covers that.
    let extraction = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| AppError::Processing(format!("PDF extraction aborted: {e}")))?;

    extraction.map_err(|e| AppError::Processing(format!("Failed to extract PDF text: {e}")))
}
