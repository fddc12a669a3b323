mod handlers;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use handlers::{delete_document, show_documents, upload_document};

use crate::html_state::HtmlState;

pub fn router<S>(max_body_bytes: usize) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new()
        .route(
            "/documents",
            get(show_documents)
                .post(upload_document)
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route("/documents/{id}/delete", post(delete_document))
}
