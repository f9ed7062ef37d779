use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::{Answer, Attempt};
use crate::schemas::attempt::{AnswerResponse, AnswerSubmit, AttemptResponse, AttemptSession};
use crate::schemas::test::QuestionPublic;
use crate::services::{attempts, scheduling, Engine};

pub(super) async fn start_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<(StatusCode, Json<AttemptSession>), ApiError> {
    let outcome = attempts::start_attempt(state.engine(), &test_id, &user).await?;
    let answers = if outcome.created {
        Vec::new()
    } else {
        state.engine().store().list_answers(&outcome.attempt.id).await?
    };
    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, Json(attempt_session(state.engine(), outcome.attempt, answers).await?)))
}

pub(super) async fn my_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    match attempts::find_for_user(state.engine(), &test_id, &user).await? {
        Some(attempt) => Ok(Json(attempt.into())),
        None => Err(ApiError::NotFound("Attempt not found".to_string())),
    }
}

pub(super) async fn get_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptSession>, ApiError> {
    let details = attempts::get_attempt(state.engine(), &attempt_id, &user).await?;
    Ok(Json(attempt_session(state.engine(), details.attempt, details.answers).await?))
}

pub(super) async fn record_answer(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path((attempt_id, question_id)): Path<(String, String)>,
    Json(payload): Json<AnswerSubmit>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate()?;

    let answer = attempts::record_answer(
        state.engine(),
        &attempt_id,
        &question_id,
        &user,
        payload.selected_option,
        payload.time_spent_seconds,
    )
    .await?;

    Ok(Json(AnswerResponse::from_answer(answer, false)))
}

pub(super) async fn submit_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let finished = attempts::submit_attempt(state.engine(), &attempt_id, &user).await?;
    Ok(Json(finished.into()))
}

/// Questions are always the participant view; correctness is only revealed on
/// finalized attempts.
async fn attempt_session(
    engine: &Engine,
    attempt: Attempt,
    answers: Vec<Answer>,
) -> Result<AttemptSession, ApiError> {
    let questions = scheduling::get_test(engine, &attempt.test_id).await?.questions;
    let reveal = attempt.status.is_terminal();

    Ok(AttemptSession {
        questions: questions.into_iter().map(QuestionPublic::from).collect(),
        answers: answers
            .into_iter()
            .map(|answer| AnswerResponse::from_answer(answer, reveal))
            .collect(),
        attempt: attempt.into(),
    })
}
