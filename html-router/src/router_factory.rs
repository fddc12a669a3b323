use axum::{extract::FromRef, middleware::from_fn_with_state, Router};
use tower_http::compression::CompressionLayer;

use crate::{html_state::HtmlState, middlewares::response_middleware::with_template_response};

/// Assembles page routers and wraps them in the template rendering layer.
pub struct RouterFactory<S> {
    app_state: HtmlState,
    routers: Vec<Router<S>>,
    compression_enabled: bool,
}

impl<S> RouterFactory<S>
where
    S: Clone + Send + Sync + 'static,
    HtmlState: FromRef<S>,
{
    pub fn new(app_state: &HtmlState) -> Self {
        Self {
            app_state: app_state.to_owned(),
            routers: Vec::new(),
            compression_enabled: false,
        }
    }

    // Merged at the root level
    pub fn add_routes(mut self, routes: Router<S>) -> Self {
        self.routers.push(routes);
        self
    }

    /// Negotiates response encoding from `Accept-Encoding`.
    pub const fn with_compression(mut self) -> Self {
        self.compression_enabled = true;
        self
    }

    pub fn build(self) -> Router<S> {
        let mut app_router = Router::new();

        for router in self.routers {
            app_router = app_router.merge(router);
        }

        app_router = app_router.layer(from_fn_with_state(
            self.app_state.clone(),
            with_template_response::<HtmlState>,
        ));

        if self.compression_enabled {
            app_router = app_router.layer(CompressionLayer::new());
        }

        app_router
    }
}
