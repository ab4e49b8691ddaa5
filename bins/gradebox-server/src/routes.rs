//! Router assembly.
//!
//! Used by `main` and by the integration tests so both exercise the same
//! route table and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::handlers as auth_handlers;
use crate::handlers::{self, MAX_UPLOAD_BYTES, X_REPORT_URL};
use crate::state::AppState;

/// CORS preflight answers are cached by browsers for this long.
pub const CORS_MAX_AGE: Duration = Duration::from_secs(1800);

pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::POST])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .expose_headers([X_REPORT_URL.clone()])
        .max_age(CORS_MAX_AGE)
}

fn upload_routes(allow_cors: bool) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/upload.txt", post(handlers::upload_txt))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));
    if allow_cors {
        router.layer(build_cors_layer())
    } else {
        router
    }
}

fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(auth_handlers::login))
        .route("/callback", get(auth_handlers::callback))
        .route("/logout", get(auth_handlers::logout))
        .route("/token", get(auth_handlers::token))
        .route("/profile", get(auth_handlers::profile))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/report/:name", get(handlers::get_report))
        .merge(upload_routes(state.options.allow_cors))
        .nest_service("/uploads", ServeDir::new(state.store.dir()));

    if state.auth.session().is_some() {
        router = router.merge(auth_routes());
    }
    if let Some(dir) = &state.options.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
