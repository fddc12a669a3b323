mod handlers;

use axum::{
    extract::FromRef,
    routing::{get, post},
    Router,
};
use handlers::{
    create_metric, create_session, create_test_case, delete_metric, delete_session,
    delete_test_case, show_session, show_sessions,
};

use crate::html_state::HtmlState;

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    Router::new()
        .route("/sessions", get(show_sessions).post(create_session))
        .route("/sessions/{id}", get(show_session))
        .route("/sessions/{id}/delete", post(delete_session))
        .route("/sessions/{id}/test-cases", post(create_test_case))
        .route("/test-cases/{id}/delete", post(delete_test_case))
        .route("/sessions/{id}/metrics", post(create_metric))
        .route("/metrics/{id}/delete", post(delete_metric))
}
