use axum::{extract::State, response::IntoResponse};
use common::storage::types::{document::Document, test_session::TestSession};
use serde::Serialize;

use crate::{
    html_state::HtmlState,
    middlewares::response_middleware::{HtmlError, TemplateResponse},
};

const RECENT_SESSIONS: usize = 5;

#[derive(Serialize)]
pub struct RecentSession {
    id: String,
    name: String,
    agent_name: String,
    status: String,
}

#[derive(Serialize)]
pub struct IndexPageData {
    session_count: usize,
    document_count: usize,
    recent_sessions: Vec<RecentSession>,
}

pub async fn index_handler(State(state): State<HtmlState>) -> Result<impl IntoResponse, HtmlError> {
    let (sessions, documents) = futures::try_join!(
        TestSession::list_newest_first(&state.db),
        Document::list_newest_first(&state.db)
    )?;

    let recent_sessions = sessions
        .iter()
        .take(RECENT_SESSIONS)
        .map(|session| RecentSession {
            id: session.id.clone(),
            name: session.name.clone(),
            agent_name: session.agent_name.clone(),
            status: format!("{:?}", session.status).to_lowercase(),
        })
        .collect();

    Ok(TemplateResponse::new_template(
        "index.html",
        IndexPageData {
            session_count: sessions.len(),
            document_count: documents.len(),
            recent_sessions,
        },
    ))
}
