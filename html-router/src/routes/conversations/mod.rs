mod handlers;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use handlers::{
    delete_conversation, evaluate_conversation, show_conversation, show_transcript,
    start_simulation, stop_conversation,
};

use crate::html_state::HtmlState;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new()
        .route("/test-cases/{id}/simulate", post(start_simulation))
        .route("/conversations/{id}", get(show_conversation))
        .route("/conversations/{id}/transcript", get(show_transcript))
        .route("/conversations/{id}/stop", post(stop_conversation))
        .route("/conversations/{id}/evaluate", post(evaluate_conversation))
        .route("/conversations/{id}/delete", post(delete_conversation))
}
