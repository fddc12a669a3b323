use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use super::embedding::EmbeddingBackend;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    /// Shared key required on the REST API when set.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub generation_model: String,
    #[serde(default = "default_model")]
    pub judge_model: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_chunk_min_chars")]
    pub chunk_min_chars: usize,
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "default_chunk_overlap_chars")]
    pub chunk_overlap_chars: usize,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_simulation_max_turns")]
    pub simulation_max_turns: u32,
    #[serde(default = "default_simulation_max_seconds")]
    pub simulation_max_seconds: u64,
    #[serde(default)]
    pub personas_path: Option<String>,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

const fn default_chunk_min_chars() -> usize {
    500
}

const fn default_chunk_max_chars() -> usize {
    1000
}

const fn default_chunk_overlap_chars() -> usize {
    100
}

const fn default_retrieval_top_k() -> usize {
    5
}

const fn default_simulation_max_turns() -> u32 {
    20
}

const fn default_simulation_max_seconds() -> u64 {
    300
}

const fn default_ingest_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "neurotest".to_string(),
            surrealdb_database: "neurotest".to_string(),
            http_port: 3000,
            api_key: None,
            generation_model: default_model(),
            judge_model: default_model(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: None,
            embedding_dimensions: default_embedding_dimensions(),
            chunk_min_chars: default_chunk_min_chars(),
            chunk_max_chars: default_chunk_max_chars(),
            chunk_overlap_chars: default_chunk_overlap_chars(),
            retrieval_top_k: default_retrieval_top_k(),
            simulation_max_turns: default_simulation_max_turns(),
            simulation_max_seconds: default_simulation_max_seconds(),
            personas_path: None,
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
