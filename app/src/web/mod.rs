pub mod auth;
pub mod portfolios;
pub mod session;
pub mod templates;

use std::path::Path;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::services::ForseerHandle;
use session::CookiePolicy;

#[derive(Clone, Debug)]
pub struct AppState {
    pub forseer: ForseerHandle,
    pub cookies: CookiePolicy,
}

async fn health() -> &'static str {
    "ok"
}

pub fn create_app(state: AppState, static_dir: &Path) -> Router {
    let protected = Router::new()
        .route(
            "/portfolios",
            get(portfolios::list).post(portfolios::create),
        )
        .route("/portfolios/{id}", get(portfolios::detail))
        .route("/portfolios/{id}/rename", post(portfolios::rename))
        .route("/portfolios/{id}/delete", post(portfolios::delete))
        .route("/portfolios/{id}/stocks", post(portfolios::add_stock))
        .route(
            "/portfolios/{id}/stocks/{symbol}",
            post(portfolios::update_stock),
        )
        .route(
            "/portfolios/{id}/stocks/{symbol}/delete",
            post(portfolios::delete_stock),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        // Static file serving
        .nest_service("/static", ServeDir::new(static_dir))
        .route("/health", get(health))
        // Authentication routes
        .route("/", get(auth::home))
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/register", get(auth::register_page).post(auth::register_submit))
        .route("/logout", post(auth::logout))
        .route(
            "/confirm/{token}",
            get(auth::confirm_page).post(auth::confirm_submit),
        )
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
