use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    conversations, documents, liveness::live, metrics, rag, readiness::ready, scores, sessions,
    test_cases,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    // Protected API endpoints (require auth when an api_key is configured)
    let protected = Router::new()
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/sessions/{id}/test-cases",
            get(test_cases::list_test_cases).post(test_cases::create_test_case),
        )
        .route(
            "/test-cases/{id}",
            get(test_cases::get_test_case)
                .patch(test_cases::update_test_case)
                .delete(test_cases::delete_test_case),
        )
        .route(
            "/sessions/{id}/metrics",
            get(metrics::list_metrics).post(metrics::create_metric),
        )
        .route(
            "/metrics/{id}",
            get(metrics::get_metric)
                .patch(metrics::update_metric)
                .delete(metrics::delete_metric),
        )
        .route(
            "/sessions/{id}/conversations",
            get(conversations::list_conversations),
        )
        .route(
            "/sessions/{id}/conversations/import",
            post(conversations::import_conversation),
        )
        .route("/sessions/{id}/scores", get(scores::session_scores))
        .route("/test-cases/{id}/simulate", post(conversations::simulate))
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{id}/stop",
            post(conversations::stop_conversation),
        )
        .route(
            "/conversations/{id}/evaluate",
            post(scores::evaluate_conversation),
        )
        .route(
            "/conversations/{id}/scores",
            get(scores::conversation_scores),
        )
        .route(
            "/documents",
            get(documents::list_documents).post(documents::upload_document).layer(
                DefaultBodyLimit::max(app_state.config.ingest_max_body_bytes),
            ),
        )
        .route("/documents/text", post(documents::create_text_document))
        .route("/documents/search", post(documents::search_documents))
        .route(
            "/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/{id}/reindex", post(documents::reindex_document))
        .route("/rag/query", post(rag::query))
        .route("/rag/evaluate", post(rag::evaluate))
        .route("/rag/evaluations", get(rag::list_evaluations))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
