use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::session::{ForceEndResponse, SessionResponse};
use crate::schemas::test::{
    QuestionResponse, QuestionsAdd, RescheduleRequest, TestCreate, TestListQuery, TestResponse,
    TestUpdate,
};
use crate::services::scheduling::{self, QuestionInput};
use crate::services::{overrides, sessions};

pub(super) async fn create_test(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<TestCreate>,
) -> Result<(StatusCode, Json<TestResponse>), ApiError> {
    payload.validate()?;

    let created = scheduling::create_test(state.engine(), &admin, payload.into()).await?;

    Ok((StatusCode::CREATED, Json(TestResponse::with_questions(created.test, created.questions))))
}

pub(super) async fn list_tests(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(params): Query<TestListQuery>,
) -> Result<Json<Vec<TestResponse>>, ApiError> {
    let tests =
        scheduling::list_tests(state.engine(), params.status, params.skip, params.limit).await?;

    Ok(Json(tests.into_iter().map(TestResponse::from_test).collect()))
}

pub(super) async fn get_test(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let found = scheduling::get_test(state.engine(), &test_id).await?;
    Ok(Json(TestResponse::with_questions(found.test, found.questions)))
}

pub(super) async fn update_test(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(payload): Json<TestUpdate>,
) -> Result<Json<TestResponse>, ApiError> {
    payload.validate()?;

    let updated = scheduling::update_test(state.engine(), &test_id, payload.into()).await?;
    Ok(Json(TestResponse::from_test(updated)))
}

pub(super) async fn add_questions(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(payload): Json<QuestionsAdd>,
) -> Result<(StatusCode, Json<Vec<QuestionResponse>>), ApiError> {
    payload.validate()?;

    let questions = payload.questions.into_iter().map(QuestionInput::from).collect();
    let saved = scheduling::add_questions(state.engine(), &test_id, questions).await?;

    Ok((StatusCode::CREATED, Json(saved.into_iter().map(QuestionResponse::from).collect())))
}

pub(super) async fn publish_test(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let published = scheduling::publish_test(state.engine(), &test_id).await?;
    Ok(Json(TestResponse::from_test(published)))
}

pub(super) async fn force_start(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<TestResponse>, ApiError> {
    let started = overrides::force_start(state.engine(), &test_id).await?;
    tracing::info!(test_id = %test_id, admin_id = %admin.user_id, "Test force-started");
    Ok(Json(TestResponse::from_test(started)))
}

pub(super) async fn force_end(
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<ForceEndResponse>, ApiError> {
    let completion = overrides::force_end(state.engine(), &test_id).await?;
    tracing::info!(
        test_id = %test_id,
        admin_id = %admin.user_id,
        timed_out = completion.sweep.timed_out,
        "Test force-ended"
    );
    Ok(Json(completion.into()))
}

pub(super) async fn reschedule(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<TestResponse>, ApiError> {
    let moved = overrides::reschedule(state.engine(), &test_id, payload.scheduled_start).await?;
    Ok(Json(TestResponse::from_test(moved)))
}

pub(super) async fn session(
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let summary = sessions::summarize(state.engine(), &test_id).await?;
    Ok(Json(summary.into()))
}
