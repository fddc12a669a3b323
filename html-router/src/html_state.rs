use std::sync::Arc;

use common::create_template_engine;
use common::storage::db::SurrealDbClient;
use common::utils::config::AppConfig;
use common::utils::llm::LanguageModel;
use common::utils::template_engine::{ProvidesTemplateEngine, TemplateEngine};
use rag_pipeline::DocumentPipeline;
use simulation::SimulationLauncher;
use tracing::debug;

#[derive(Clone)]
pub struct HtmlState {
    pub db: Arc<SurrealDbClient>,
    pub templates: Arc<TemplateEngine>,
    pub config: AppConfig,
    pub language_model: Arc<dyn LanguageModel>,
    pub documents: Arc<DocumentPipeline>,
    pub simulations: SimulationLauncher,
}

impl HtmlState {
    pub fn new_with_resources(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        language_model: Arc<dyn LanguageModel>,
        documents: Arc<DocumentPipeline>,
        simulations: SimulationLauncher,
        template_engine: Option<Arc<TemplateEngine>>,
    ) -> Self {
        let templates =
            template_engine.unwrap_or_else(|| Arc::new(create_template_engine!("templates")));
        debug!("Template engine configured for html_router.");

        Self {
            db,
            templates,
            config,
            language_model,
            documents,
            simulations,
        }
    }

    /// Judge model for evaluations triggered from the UI.
    pub fn judge_model(&self) -> Option<String> {
        Some(self.config.judge_model.clone()).filter(|m| !m.trim().is_empty())
    }
}

impl ProvidesTemplateEngine for HtmlState {
    fn template_engine(&self) -> &Arc<TemplateEngine> {
        &self.templates
    }
}
