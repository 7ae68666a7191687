pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::errors::panic_response;
use crate::ranking::handlers;
use crate::report::handlers::handle_report;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let router = Router::new()
        .route("/", get(handlers::handle_banner))
        .route("/health", get(health::health_handler))
        .route("/analyze", post(handlers::handle_analyze))
        .route("/report", post(handle_report))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state);
    catch_panics(router)
}

/// A panicking handler answers 500 INTERNAL_ERROR instead of dropping the connection.
fn catch_panics(router: Router) -> Router {
    router.layer(CatchPanicLayer::custom(panic_response))
}
