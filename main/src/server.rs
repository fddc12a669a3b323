use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::{extract::FromRef, Router};
use common::{
    error::AppError,
    storage::db::SurrealDbClient,
    utils::{
        config::{get_config, AppConfig},
        embedding::EmbeddingProvider,
        llm::{LanguageModel, OpenAiLanguageModel},
    },
};
use html_router::{html_routes, html_state::HtmlState};
use rag_pipeline::{ChunkSettings, DocumentPipeline};
use simulation::{PersonaLibrary, SimulationLauncher, SimulationRegistry, SimulationRunner};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    // Any OpenAI-compatible endpoint works here, Gemini's included
    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = Arc::new(
        EmbeddingProvider::from_config(&config, Some(Arc::clone(&openai_client))).await?,
    );
    info!(
        embedding_backend = ?config.embedding_backend,
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let language_model: Arc<dyn LanguageModel> = Arc::new(OpenAiLanguageModel::new(
        openai_client,
        config.generation_model.clone(),
    ));

    let app = build_app(config.clone(), db, language_model, embedding_provider).await?;

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wires the shared services into both routers.
async fn build_app(
    config: AppConfig,
    db: Arc<SurrealDbClient>,
    language_model: Arc<dyn LanguageModel>,
    embedding_provider: Arc<EmbeddingProvider>,
) -> Result<Router, AppError> {
    let documents = Arc::new(
        DocumentPipeline::new(
            Arc::clone(&db),
            embedding_provider,
            Arc::clone(&language_model),
            ChunkSettings::from_config(&config),
        )?
        .with_generation_model(config.generation_model.clone()),
    );

    let personas = PersonaLibrary::load_or_empty(config.personas_path.as_deref()).await;
    info!(personas = personas.len(), "Persona library loaded");

    let runner = SimulationRunner::new(Arc::clone(&db), Arc::clone(&language_model))
        .with_goal_model(Some(config.judge_model.clone()));
    let simulations = SimulationLauncher::new(
        Arc::clone(&db),
        Arc::new(runner),
        SimulationRegistry::new(),
        Arc::new(personas),
        SimulationLauncher::max_duration_from_config(&config),
    );

    let html_state = HtmlState::new_with_resources(
        Arc::clone(&db),
        config.clone(),
        Arc::clone(&language_model),
        Arc::clone(&documents),
        simulations.clone(),
        None,
    );
    let api_state = ApiState::new(db, config, language_model, documents, simulations);

    Ok(Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .merge(html_routes(&html_state))
        .with_state(AppState {
            api_state,
            html_state,
        }))
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
    html_state: HtmlState,
}
