mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::api::attempts;
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_test).get(handlers::list_tests))
        .route("/:test_id", get(handlers::get_test).patch(handlers::update_test))
        .route("/:test_id/questions", post(handlers::add_questions))
        .route("/:test_id/publish", post(handlers::publish_test))
        .route("/:test_id/force-start", post(handlers::force_start))
        .route("/:test_id/force-end", post(handlers::force_end))
        .route("/:test_id/reschedule", post(handlers::reschedule))
        .route("/:test_id/session", get(handlers::session))
        .merge(attempts::test_routes())
}
