use super::config::AppConfig;

const MAX_TITLE_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestValidationError {
    PayloadTooLarge(String),
    BadRequest(String),
}

/// Checks a document submission before any extraction or embedding work.
pub fn validate_document_input(
    config: &AppConfig,
    title: &str,
    content_len: usize,
) -> Result<(), IngestValidationError> {
    if title.trim().is_empty() {
        return Err(IngestValidationError::BadRequest(
            "Document title must not be empty".to_string(),
        ));
    }

    if title.len() > MAX_TITLE_BYTES {
        return Err(IngestValidationError::PayloadTooLarge(format!(
            "Title is too large. Maximum allowed is {MAX_TITLE_BYTES} bytes"
        )));
    }

    if content_len == 0 {
        return Err(IngestValidationError::BadRequest(
            "Document content must not be empty".to_string(),
        ));
    }

    if content_len > config.ingest_max_body_bytes {
        return Err(IngestValidationError::PayloadTooLarge(format!(
            "Content is too large. Maximum allowed is {} bytes",
            config.ingest_max_body_bytes
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_document_input_rejects_blank_title() {
        let result = validate_document_input(&AppConfig::default(), "  ", 10);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_document_input_rejects_empty_content() {
        let result = validate_document_input(&AppConfig::default(), "Doc", 0);
        assert!(matches!(result, Err(IngestValidationError::BadRequest(_))));
    }

    #[test]
    fn validate_document_input_rejects_oversized_content() {
        let config = AppConfig {
            ingest_max_body_bytes: 4,
            ..Default::default()
        };
        let result = validate_document_input(&config, "Doc", 5);

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_document_input_rejects_oversized_title() {
        let title = "x".repeat(MAX_TITLE_BYTES + 1);
        let result = validate_document_input(&AppConfig::default(), &title, 5);

        assert!(matches!(
            result,
            Err(IngestValidationError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn validate_document_input_accepts_valid_payload() {
        let result = validate_document_input(&AppConfig::default(), "Doc", 12);
        assert!(result.is_ok());
    }
}
