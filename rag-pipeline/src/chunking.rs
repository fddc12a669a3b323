use common::{error::AppError, utils::config::AppConfig};
use text_splitter::{ChunkCapacity, ChunkConfig, MarkdownSplitter, TextSplitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

impl TextFormat {
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            _ => Self::Plain,
        }
    }
}

/// Character-based chunk bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    pub min_chars: usize,
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ChunkSettings {
    pub const fn from_config(config: &AppConfig) -> Self {
        Self {
            min_chars: config.chunk_min_chars,
            max_chars: config.chunk_max_chars,
            overlap_chars: config.chunk_overlap_chars,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.min_chars == 0 || self.max_chars == 0 || self.min_chars > self.max_chars {
            return Err(AppError::Validation(
                "invalid chunk bounds; ensure 0 < min <= max".into(),
            ));
        }

        if self.overlap_chars >= self.min_chars {
            return Err(AppError::Validation(format!(
                "chunk_min_chars must be greater than the configured overlap of {}",
                self.overlap_chars
            )));
        }

        Ok(())
    }

    fn chunk_config(&self) -> Result<ChunkConfig<text_splitter::Characters>, AppError> {
        let capacity = ChunkCapacity::new(self.min_chars)
            .with_max(self.max_chars)
            .map_err(|e| AppError::Validation(format!("invalid chunk bounds: {e}")))?;
        ChunkConfig::new(capacity)
            .with_overlap(self.overlap_chars)
            .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))
    }
}

/// Splits `text` into overlapping chunks. Whitespace-only input yields none.
pub fn split_text(
    text: &str,
    format: TextFormat,
    settings: ChunkSettings,
) -> Result<Vec<String>, AppError> {
    settings.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let config = settings.chunk_config()?;
    let chunks: Vec<String> = match format {
        TextFormat::Markdown => MarkdownSplitter::new(config)
            .chunks(text)
            .map(str::to_owned)
            .collect(),
        TextFormat::Plain => TextSplitter::new(config)
            .chunks(text)
            .map(str::to_owned)
            .collect(),
    };

    Ok(chunks
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect())
}
