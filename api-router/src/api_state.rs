use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, llm::LanguageModel},
};
use rag_pipeline::DocumentPipeline;
use simulation::SimulationLauncher;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub language_model: Arc<dyn LanguageModel>,
    pub documents: Arc<DocumentPipeline>,
    pub simulations: SimulationLauncher,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        language_model: Arc<dyn LanguageModel>,
        documents: Arc<DocumentPipeline>,
        simulations: SimulationLauncher,
    ) -> Self {
        Self {
            db,
            config,
            language_model,
            documents,
            simulations,
        }
    }

    /// Model override for judge-style calls, unless the request names one.
    pub fn judge_model(&self, requested: Option<String>) -> Option<String> {
        requested
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(self.config.judge_model.clone()))
    }
}
