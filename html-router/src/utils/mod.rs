pub mod text_content_preview;
