mod handlers;

use axum::{routing::get, routing::post, routing::put, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/answers/:question_id", put(handlers::record_answer))
        .route("/:attempt_id/submit", post(handlers::submit_attempt))
}

/// Attempt routes that hang off a test, merged into the catalog router.
pub(crate) fn test_routes() -> Router<AppState> {
    Router::new()
        .route("/:test_id/attempts", post(handlers::start_attempt))
        .route("/:test_id/attempts/me", get(handlers::my_attempt))
}
