pub mod html_state;
pub mod middlewares;
pub mod router_factory;
pub mod routes;
pub mod utils;

use axum::{extract::FromRef, Router};
use html_state::HtmlState;
use router_factory::RouterFactory;

/// Html routes
pub fn html_routes<S>(app_state: &HtmlState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    RouterFactory::new(app_state)
        .add_routes(routes::index::router())
        .add_routes(routes::sessions::router())
        .add_routes(routes::conversations::router())
        .add_routes(routes::documents::router(
            app_state.config.ingest_max_body_bytes,
        ))
        .with_compression()
        .build()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use common::{
        storage::{
            db::SurrealDbClient,
            types::{document::Document, test_session::TestSession},
        },
        utils::{
            config::AppConfig,
            embedding::EmbeddingProvider,
            llm::{LanguageModel, ScriptedLanguageModel},
        },
    };
    use rag_pipeline::{ChunkSettings, DocumentPipeline};
    use simulation::{PersonaLibrary, SimulationLauncher, SimulationRegistry, SimulationRunner};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;

    async fn test_app() -> (Router, Arc<SurrealDbClient>) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let language_model: Arc<dyn LanguageModel> = Arc::new(
            ScriptedLanguageModel::default().with_fallback("Refunds take five days."),
        );
        let documents = Arc::new(
            DocumentPipeline::new(
                Arc::clone(&db),
                Arc::new(EmbeddingProvider::new_hashed(32)),
                Arc::clone(&language_model),
                ChunkSettings {
                    min_chars: 10,
                    max_chars: 60,
                    overlap_chars: 0,
                },
            )
            .expect("valid chunk settings"),
        );
        let simulations = SimulationLauncher::new(
            Arc::clone(&db),
            Arc::new(SimulationRunner::new(
                Arc::clone(&db),
                Arc::clone(&language_model),
            )),
            SimulationRegistry::new(),
            Arc::new(PersonaLibrary::default()),
            None,
        );

        let state = HtmlState::new_with_resources(
            Arc::clone(&db),
            AppConfig::default(),
            language_model,
            documents,
            simulations,
            None,
        );
        (html_routes(&state).with_state(state), db)
    }

    async fn post_form(app: &Router, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn get(app: &Router, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_index_renders() {
        let (app, _db) = test_app().await;
        let response = get(&app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("NeuroTest"));
    }

    #[tokio::test]
    async fn test_create_session_redirects_to_detail() {
        let (app, db) = test_app().await;

        let response = post_form(
            &app,
            "/sessions",
            "name=Payments&agent_name=Ira&agent_prompt=You+help+with+payments.&max_turns=4",
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let sessions = TestSession::list_newest_first(&db).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].max_turns, 4);
        assert_eq!(location(&response), format!("/sessions/{}", sessions[0].id));

        let session_id = sessions[0].id.clone();
        let response = post_form(
            &app,
            &format!("/sessions/{session_id}/test-cases"),
            "name=Refund&persona_name=Ravi&persona_prompt=You+want+a+refund.",
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = post_form(
            &app,
            &format!("/sessions/{session_id}/metrics"),
            "name=Empathy&description=Shows+empathy&scoring_type=boolean&weight=2",
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let html = body_text(get(&app, &format!("/sessions/{session_id}")).await).await;
        assert!(html.contains("Payments"));
        assert!(html.contains("Refund"));
        assert!(html.contains("Ravi"));
        assert!(html.contains("Empathy"));
    }

    #[tokio::test]
    async fn test_invalid_session_form_rerenders_with_error() {
        let (app, db) = test_app().await;

        let response = post_form(
            &app,
            "/sessions",
            "name=Payments&agent_name=Ira&agent_prompt=+++",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("agent_prompt must not be empty"));
        assert!(TestSession::list_newest_first(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_metric_renders_bad_request() {
        let (app, db) = test_app().await;
        let session = TestSession::new("S".into(), "Ira".into(), "Prompt".into());
        db.store_item(session.clone()).await.unwrap();

        let response = post_form(
            &app,
            &format!("/sessions/{}/metrics", session.id),
            "name=Tone&description=Polite&scoring_type=stars",
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("unknown scoring type"));
    }

    #[tokio::test]
    async fn test_missing_session_renders_not_found() {
        let (app, _db) = test_app().await;
        let response = get(&app, "/sessions/does-not-exist").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn test_htmx_error_becomes_toast() {
        let (app, _db) = test_app().await;
        let request = Request::builder()
            .uri("/conversations/missing")
            .header("HX-Request", "true")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let trigger = response
            .headers()
            .get("HX-Trigger")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(trigger.contains("Page Not Found"));
    }

    #[tokio::test]
    async fn test_upload_search_and_delete_document() {
        let (app, db) = test_app().await;

        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             Refund policy\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"policy.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             Refunds are processed within five business days of the request.\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let documents = Document::list_newest_first(&db).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].title, "Refund policy");

        let html = body_text(get(&app, "/documents?q=refunds+processed").await).await;
        assert!(html.contains("Refund policy"));
        assert!(html.contains("five business days"));

        let html = body_text(get(&app, "/documents?ask=How+long+do+refunds+take").await).await;
        assert!(html.contains("Refunds take five days."));

        let response = post_form(&app, &format!("/documents/{}/delete", documents[0].id), "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(Document::list_newest_first(&db).await.unwrap().is_empty());
    }
}
