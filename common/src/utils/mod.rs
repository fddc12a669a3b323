pub mod config;
pub mod embedding;
pub mod ingest_limits;
pub mod llm;
pub mod template_engine;
pub mod validation;
