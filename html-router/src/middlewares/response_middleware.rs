use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Extension,
};
use axum_htmx::{HxRequest, HX_TRIGGER};
use common::{
    error::AppError,
    utils::{
        ingest_limits::IngestValidationError,
        template_engine::{ProvidesTemplateEngine, Value},
    },
};
use minijinja::context;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::html_state::HtmlState;

const APP_NAME: &str = "NeuroTest";

pub trait ProvidesHtmlState {
    fn html_state(&self) -> &HtmlState;
}

impl ProvidesHtmlState for HtmlState {
    fn html_state(&self) -> &HtmlState {
        self
    }
}

#[derive(Clone, Debug)]
pub enum TemplateKind {
    Full(String),
    Partial(String, String),
    Error(StatusCode),
    Redirect(String),
}

/// A handler's rendering request; the middleware below turns it into HTML.
#[derive(Clone)]
pub struct TemplateResponse {
    template_kind: TemplateKind,
    context: Value,
}

impl TemplateResponse {
    pub fn new_template<T: Serialize>(name: impl Into<String>, context: T) -> Self {
        Self {
            template_kind: TemplateKind::Full(name.into()),
            context: Value::from_serialize(&context),
        }
    }

    pub fn new_partial<T: Serialize>(
        template: impl Into<String>,
        block: impl Into<String>,
        context: T,
    ) -> Self {
        Self {
            template_kind: TemplateKind::Partial(template.into(), block.into()),
            context: Value::from_serialize(&context),
        }
    }

    pub fn error(status: StatusCode, title: &str, description: &str) -> Self {
        let ctx = context! {
            status_code => status.as_u16(),
            title => title,
            description => description
        };
        Self {
            template_kind: TemplateKind::Error(status),
            context: ctx,
        }
    }

    pub fn not_found() -> Self {
        Self::error(
            StatusCode::NOT_FOUND,
            "Page Not Found",
            "The page you're looking for doesn't exist or was removed.",
        )
    }

    pub fn server_error() -> Self {
        Self::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "Something went wrong on our end.",
        )
    }

    pub fn bad_request(message: &str) -> Self {
        Self::error(StatusCode::BAD_REQUEST, "Bad Request", message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::error(StatusCode::CONFLICT, "Conflict", message)
    }

    pub fn redirect(path: impl Into<String>) -> Self {
        Self {
            template_kind: TemplateKind::Redirect(path.into()),
            context: Value::from_serialize(()),
        }
    }
}

impl IntoResponse for TemplateResponse {
    fn into_response(self) -> Response {
        Extension(self).into_response()
    }
}

#[derive(Serialize)]
struct ContextWrapper<'a> {
    app_name: &'a str,
    current_path: &'a str,
    running_simulations: usize,
    #[serde(flatten)]
    context: HashMap<String, Value>,
}

// Headers to forward from the handler's response
const HTMX_HEADERS_TO_FORWARD: &[&str] = &["HX-Push", "HX-Trigger", "HX-Redirect"];

pub async fn with_template_response<S>(
    State(state): State<S>,
    HxRequest(is_htmx): HxRequest,
    req: Request,
    next: Next,
) -> Response
where
    S: ProvidesTemplateEngine + ProvidesHtmlState + Clone + Send + Sync + 'static,
{
    let current_path = req.uri().path().to_string();
    let response = next.run(req).await;

    let Some(template_response) = response.extensions().get::<TemplateResponse>().cloned() else {
        return response;
    };

    let template_engine = state.template_engine();
    let running_simulations = state.html_state().simulations.registry().running_count();

    let context_map = match context_to_map(&template_response.context) {
        Ok(map) => map,
        Err(kind) => {
            error!(
                ?kind,
                template_kind = ?template_response.template_kind,
                "Template context must be a map or unit"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response();
        }
    };

    let context = Value::from_serialize(&ContextWrapper {
        app_name: APP_NAME,
        current_path: &current_path,
        running_simulations,
        context: context_map,
    });

    match &template_response.template_kind {
        TemplateKind::Full(name) => match template_engine.render(name, &context) {
            Ok(html) => {
                let mut final_response = Html(html).into_response();
                forward_headers(response.headers(), final_response.headers_mut());
                final_response
            }
            Err(e) => {
                error!(template = %name, error = ?e, "Failed to render template");
                (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response()
            }
        },
        TemplateKind::Partial(template, block) => {
            match template_engine.render_block(template, block, &context) {
                Ok(html) => {
                    let mut final_response = Html(html).into_response();
                    forward_headers(response.headers(), final_response.headers_mut());
                    final_response
                }
                Err(e) => {
                    error!(%template, %block, error = ?e, "Failed to render block");
                    (StatusCode::INTERNAL_SERVER_ERROR, Html(fallback_error())).into_response()
                }
            }
        }
        TemplateKind::Error(status) => {
            if is_htmx {
                // HTMX callers get a toast instead of a page swap
                let attr = |name: &str, default: &str| {
                    template_response
                        .context
                        .get_attr(name)
                        .ok()
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_else(|| default.to_string())
                };
                let trigger_payload = json!({"toast": {
                    "title": attr("title", "Error"),
                    "description": attr("description", "An error occurred."),
                    "type": "error"
                }});
                (
                    StatusCode::NO_CONTENT,
                    [(HX_TRIGGER, trigger_payload.to_string())],
                    "",
                )
                    .into_response()
            } else {
                match template_engine.render("errors/error.html", &context) {
                    Ok(html) => (*status, Html(html)).into_response(),
                    Err(e) => {
                        error!(error = ?e, "Critical: Failed to render 'errors/error.html'");
                        (*status, Html(fallback_error())).into_response()
                    }
                }
            }
        }
        TemplateKind::Redirect(path) => {
            if is_htmx {
                (StatusCode::OK, [(axum_htmx::HX_REDIRECT, path.as_str())], "").into_response()
            } else {
                Redirect::to(path).into_response()
            }
        }
    }
}

fn context_to_map(value: &Value) -> Result<HashMap<String, Value>, minijinja::value::ValueKind> {
    match value.kind() {
        minijinja::value::ValueKind::Map => {
            let mut map = HashMap::new();
            if let Ok(keys) = value.try_iter() {
                for key in keys {
                    if let Ok(val) = value.get_item(&key) {
                        map.insert(key.to_string(), val);
                    }
                }
            }
            Ok(map)
        }
        minijinja::value::ValueKind::None | minijinja::value::ValueKind::Undefined => {
            Ok(HashMap::new())
        }
        other => Err(other),
    }
}

fn forward_headers(from: &axum::http::HeaderMap, to: &mut axum::http::HeaderMap) {
    for &header_name in HTMX_HEADERS_TO_FORWARD {
        if let Ok(name) = HeaderName::from_bytes(header_name.as_bytes()) {
            if let Some(value) = from.get(&name) {
                to.insert(name.clone(), value.clone());
            }
        }
    }
}

#[derive(Debug)]
pub enum HtmlError {
    AppError(AppError),
    TemplateError(String),
}

impl From<AppError> for HtmlError {
    fn from(err: AppError) -> Self {
        Self::AppError(err)
    }
}

impl From<surrealdb::Error> for HtmlError {
    fn from(err: surrealdb::Error) -> Self {
        Self::AppError(AppError::from(err))
    }
}

impl From<minijinja::Error> for HtmlError {
    fn from(err: minijinja::Error) -> Self {
        Self::TemplateError(err.to_string())
    }
}

impl From<IngestValidationError> for HtmlError {
    fn from(err: IngestValidationError) -> Self {
        match err {
            IngestValidationError::PayloadTooLarge(msg) | IngestValidationError::BadRequest(msg) => {
                Self::AppError(AppError::Validation(msg))
            }
        }
    }
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        match self {
            Self::AppError(err) => match err {
                AppError::NotFound(_) => TemplateResponse::not_found().into_response(),
                AppError::Validation(msg) => TemplateResponse::bad_request(&msg).into_response(),
                AppError::Conflict(msg) => TemplateResponse::conflict(&msg).into_response(),
                _ => {
                    error!(error = ?err, "Internal error");
                    TemplateResponse::server_error().into_response()
                }
            },
            Self::TemplateError(err) => {
                error!(error = %err, "Template error");
                TemplateResponse::server_error().into_response()
            }
        }
    }
}

fn fallback_error() -> String {
    r#"
    <html>
        <body>
            <main>
                <h1>Error</h1>
                <p>Sorry, something went wrong displaying this page.</p>
            </main>
        </body>
    </html>
    "#
    .to_string()
}
