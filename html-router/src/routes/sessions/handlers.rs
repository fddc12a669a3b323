use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Form,
};
use common::{
    error::AppError,
    storage::types::{
        conversation::Conversation,
        evaluation::Evaluation,
        score::{MetricAggregate, Score, ScoringType},
        scoring_metric::ScoringMetric,
        test_case::TestCase,
        test_session::{TestSession, DEFAULT_MAX_TURNS},
    },
    utils::validation,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    html_state::HtmlState,
    middlewares::response_middleware::{HtmlError, TemplateResponse},
    utils::text_content_preview::preview,
};

#[derive(Serialize)]
pub struct SessionListItem {
    id: String,
    name: String,
    agent_name: String,
    status: String,
    created_at: String,
}

impl From<&TestSession> for SessionListItem {
    fn from(session: &TestSession) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            agent_name: session.agent_name.clone(),
            status: format!("{:?}", session.status).to_lowercase(),
            created_at: session.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Serialize, Default)]
pub struct SessionFormValues {
    name: String,
    description: String,
    agent_name: String,
    agent_prompt: String,
    goal: String,
    max_turns: String,
}

#[derive(Serialize)]
pub struct SessionsPageData {
    sessions: Vec<SessionListItem>,
    form: SessionFormValues,
    error: Option<String>,
}

#[derive(Serialize)]
pub struct TestCaseItem {
    id: String,
    name: String,
    persona_name: String,
    persona_preview: String,
    scenario: String,
    max_turns: u32,
    agent_speaks_first: bool,
}

#[derive(Serialize)]
pub struct ConversationItem {
    id: String,
    persona_name: String,
    source: String,
    status: String,
    end_reason: Option<String>,
    created_at: String,
    weighted_score: Option<f64>,
    running: bool,
}

#[derive(Serialize)]
pub struct SessionPageData {
    session: TestSession,
    created_at: String,
    test_cases: Vec<TestCaseItem>,
    metrics: Vec<ScoringMetric>,
    conversations: Vec<ConversationItem>,
    aggregates: Vec<MetricAggregate>,
}

pub async fn show_sessions(State(state): State<HtmlState>) -> Result<impl IntoResponse, HtmlError> {
    render_sessions_page(&state, SessionFormValues::default(), None).await
}

async fn render_sessions_page(
    state: &HtmlState,
    form: SessionFormValues,
    error: Option<String>,
) -> Result<TemplateResponse, HtmlError> {
    let sessions = TestSession::list_newest_first(&state.db).await?;

    Ok(TemplateResponse::new_template(
        "sessions/list.html",
        SessionsPageData {
            sessions: sessions.iter().map(SessionListItem::from).collect(),
            form,
            error,
        },
    ))
}

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agent_name: String,
    pub agent_prompt: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub max_turns: String,
}

pub async fn create_session(
    State(state): State<HtmlState>,
    Form(input): Form<SessionParams>,
) -> Result<impl IntoResponse, HtmlError> {
    match build_session(&input) {
        Ok(session) => {
            state.db.store_item(session.clone()).await?;
            info!(session_id = %session.id, "Created test session from UI");
            Ok(TemplateResponse::redirect(format!("/sessions/{}", session.id)))
        }
        Err(AppError::Validation(message)) => {
            let form = SessionFormValues {
                name: input.name,
                description: input.description,
                agent_name: input.agent_name,
                agent_prompt: input.agent_prompt,
                goal: input.goal,
                max_turns: input.max_turns,
            };
            render_sessions_page(&state, form, Some(message)).await
        }
        Err(err) => Err(err.into()),
    }
}

fn build_session(input: &SessionParams) -> Result<TestSession, AppError> {
    let mut session = TestSession::new(
        validation::required_text("name", &input.name)?,
        validation::required_text("agent_name", &input.agent_name)?,
        validation::required_text("agent_prompt", &input.agent_prompt)?,
    );
    session.description = input.description.trim().to_string();
    session.goal = validation::optional_text(Some(input.goal.clone()));
    session.max_turns = validation::max_turns(
        validation::parse_optional("max_turns", &input.max_turns)?.unwrap_or(DEFAULT_MAX_TURNS),
    )?;
    Ok(session)
}

pub async fn show_session(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let session = TestSession::get(&id, &state.db).await?;
    let test_cases = TestCase::list_for_session(&id, &state.db).await?;
    let metrics = ScoringMetric::list_for_session(&id, &state.db).await?;
    let conversations = Conversation::list_for_session(&id, &state.db).await?;
    let scores = Score::list_for_session(&id, &state.db).await?;

    let registry = state.simulations.registry();
    let mut conversation_items = Vec::with_capacity(conversations.len());
    for conversation in &conversations {
        let latest = Evaluation::latest_for_conversation(&conversation.id, &state.db).await?;
        conversation_items.push(ConversationItem {
            id: conversation.id.clone(),
            persona_name: conversation.persona_name.clone(),
            source: format!("{:?}", conversation.source).to_lowercase(),
            status: format!("{:?}", conversation.status).to_lowercase(),
            end_reason: conversation.end_reason.map(|r| format!("{r:?}")),
            created_at: conversation.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            weighted_score: latest.and_then(|e| e.summary.weighted_score),
            running: registry.is_running(&conversation.id),
        });
    }

    let test_case_items = test_cases
        .iter()
        .map(|case| TestCaseItem {
            id: case.id.clone(),
            name: case.name.clone(),
            persona_name: case.persona_name.clone(),
            persona_preview: preview(&case.persona_prompt),
            scenario: case.scenario.clone(),
            max_turns: case.effective_max_turns(&session),
            agent_speaks_first: case.agent_speaks_first,
        })
        .collect();

    Ok(TemplateResponse::new_template(
        "sessions/detail.html",
        SessionPageData {
            created_at: session.created_at.format("%Y-%m-%d %H:%M").to_string(),
            session,
            test_cases: test_case_items,
            metrics,
            conversations: conversation_items,
            aggregates: Score::aggregate_by_metric(&scores),
        },
    ))
}

pub async fn delete_session(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    for conversation in Conversation::list_for_session(&id, &state.db).await? {
        state.simulations.stop_and_wait(&conversation.id).await;
    }
    TestSession::delete_cascade(&id, &state.db).await?;
    info!(session_id = %id, "Deleted test session from UI");
    Ok(TemplateResponse::redirect("/sessions"))
}

#[derive(Debug, Deserialize)]
pub struct TestCaseParams {
    pub name: String,
    #[serde(default)]
    pub persona_name: String,
    #[serde(default)]
    pub persona_prompt: String,
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub expected_outcome: String,
    #[serde(default)]
    pub max_turns: String,
    /// Checkbox: present when ticked.
    #[serde(default)]
    pub simulator_speaks_first: Option<String>,
}

pub async fn create_test_case(
    State(state): State<HtmlState>,
    Path(session_id): Path<String>,
    Form(input): Form<TestCaseParams>,
) -> Result<impl IntoResponse, HtmlError> {
    let session = TestSession::get(&session_id, &state.db).await?;

    let mut case = TestCase::new(
        session.id,
        validation::required_text("name", &input.name)?,
        input.persona_prompt.trim().to_string(),
    );
    if let Some(persona_name) = validation::optional_text(Some(input.persona_name)) {
        case.persona_name = persona_name;
    }
    case.scenario = input.scenario.trim().to_string();
    case.goal = validation::optional_text(Some(input.goal));
    case.expected_outcome = input.expected_outcome.trim().to_string();
    case.max_turns = validation::parse_optional("max_turns", &input.max_turns)?
        .map(validation::max_turns)
        .transpose()?;
    case.agent_speaks_first = input.simulator_speaks_first.is_none();

    state.db.store_item(case.clone()).await?;
    info!(test_case_id = %case.id, %session_id, "Created test case from UI");

    Ok(TemplateResponse::redirect(format!("/sessions/{session_id}")))
}

pub async fn delete_test_case(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let case = TestCase::get(&id, &state.db).await?;
    state.db.delete_item::<TestCase>(&id).await?;
    Ok(TemplateResponse::redirect(format!(
        "/sessions/{}",
        case.session_id
    )))
}

#[derive(Debug, Deserialize)]
pub struct MetricParams {
    pub name: String,
    pub description: String,
    pub scoring_type: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub weight: String,
}

pub async fn create_metric(
    State(state): State<HtmlState>,
    Path(session_id): Path<String>,
    Form(input): Form<MetricParams>,
) -> Result<impl IntoResponse, HtmlError> {
    let session = TestSession::get(&session_id, &state.db).await?;
    let scoring_type: ScoringType = input.scoring_type.parse()?;

    let mut metric = ScoringMetric::new(
        session.id,
        validation::required_text("name", &input.name)?,
        validation::required_text("description", &input.description)?,
        scoring_type,
    );
    metric.instructions = input.instructions.trim().to_string();
    metric.weight =
        validation::weight(validation::parse_optional("weight", &input.weight)?.unwrap_or(1.0))?;

    state.db.store_item(metric.clone()).await?;
    info!(metric_id = %metric.id, %session_id, "Created scoring metric from UI");

    Ok(TemplateResponse::redirect(format!("/sessions/{session_id}")))
}

pub async fn delete_metric(
    State(state): State<HtmlState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HtmlError> {
    let metric = ScoringMetric::get(&id, &state.db).await?;
    state.db.delete_item::<ScoringMetric>(&id).await?;
    Ok(TemplateResponse::redirect(format!(
        "/sessions/{}",
        metric.session_id
    )))
}
