use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::metrics::{ATTEMPTS_STARTED, ATTEMPTS_SUBMITTED, ATTEMPTS_TIMED_OUT};
use crate::db::models::{Answer, Attempt};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::{FinalizeAttempt, NewAnswer, NewAttempt};
use crate::services::errors::{LifecycleError, LifecycleResult};
use crate::services::events::{emit, LifecycleEvent};
use crate::services::lifecycle::load_test;
use crate::services::sessions::publish_stats;
use crate::services::timing::{window_position, WindowPosition};
use crate::services::{Actor, Engine};

const TEST_ENDED: &str = "test has ended";
const TEST_NOT_STARTED: &str = "test has not started yet";
const ALREADY_COMPLETED: &str = "already completed this test";
const ATTEMPT_FINALIZED: &str = "attempt is already finalized";

#[derive(Debug, Clone)]
pub(crate) struct StartOutcome {
    pub(crate) attempt: Attempt,
    /// `false` when an in-progress attempt was handed back instead.
    pub(crate) created: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptDetails {
    pub(crate) attempt: Attempt,
    pub(crate) answers: Vec<Answer>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) timed_out: usize,
    pub(crate) failures: usize,
}

pub(crate) async fn start_attempt(
    engine: &Engine,
    test_id: &str,
    actor: &Actor,
) -> LifecycleResult<StartOutcome> {
    let store = engine.store();
    let test = load_test(engine, test_id).await?;
    let now = engine.now();

    match test.status {
        TestStatus::Active => {}
        TestStatus::Completed => return Err(LifecycleError::state(TEST_ENDED, test.status)),
        TestStatus::Draft | TestStatus::Scheduled => {
            return Err(LifecycleError::state(TEST_NOT_STARTED, test.status))
        }
    }
    match window_position(&test, now) {
        WindowPosition::Open => {}
        WindowPosition::NotOpen => return Err(LifecycleError::state(TEST_NOT_STARTED, test.status)),
        WindowPosition::Closed => return Err(LifecycleError::state(TEST_ENDED, test.status)),
    }

    let existing = store.list_attempts_for_user(test_id, &actor.user_id).await?;
    if let Some(open) = existing.iter().find(|attempt| attempt.status == AttemptStatus::InProgress) {
        return Ok(StartOutcome { attempt: open.clone(), created: false });
    }
    if !existing.is_empty() {
        return Err(LifecycleError::conflict(ALREADY_COMPLETED));
    }

    let attempt_id = Uuid::new_v4().to_string();
    let inserted = store
        .create_attempt(NewAttempt {
            id: attempt_id.clone(),
            test_id: test_id.to_string(),
            user_id: actor.user_id.clone(),
            started_at: now,
        })
        .await?;

    if !inserted {
        // A concurrent start for the same user won the insert.
        let winner = store
            .list_attempts_for_user(test_id, &actor.user_id)
            .await?
            .into_iter()
            .find(|attempt| attempt.status == AttemptStatus::InProgress);
        return match winner {
            Some(attempt) => Ok(StartOutcome { attempt, created: false }),
            None => Err(LifecycleError::conflict(ALREADY_COMPLETED)),
        };
    }

    let attempt = store
        .find_attempt(&attempt_id)
        .await?
        .ok_or_else(|| LifecycleError::not_found("Attempt not found"))?;

    metrics::counter!(ATTEMPTS_STARTED).increment(1);
    tracing::info!(test_id, attempt_id = %attempt.id, user_id = %actor.user_id, "Attempt started");
    emit(
        engine,
        LifecycleEvent::ParticipantJoined {
            test_id: test_id.to_string(),
            attempt_id: attempt.id.clone(),
            user_id: attempt.user_id.clone(),
        },
    )
    .await;
    publish_stats(engine, test_id).await;

    Ok(StartOutcome { attempt, created: true })
}

pub(crate) async fn record_answer(
    engine: &Engine,
    attempt_id: &str,
    question_id: &str,
    actor: &Actor,
    selected_option: i32,
    time_spent_seconds: i32,
) -> LifecycleResult<Answer> {
    if selected_option < 0 {
        return Err(LifecycleError::validation("selected_option must be non-negative"));
    }
    if time_spent_seconds < 0 {
        return Err(LifecycleError::validation("time_spent_seconds must be non-negative"));
    }

    let store = engine.store();
    let attempt = load_owned_attempt(engine, attempt_id, actor).await?;
    if attempt.status != AttemptStatus::InProgress {
        return Err(LifecycleError::state(ATTEMPT_FINALIZED, attempt.status));
    }

    let question = store
        .find_question(question_id)
        .await?
        .filter(|question| question.test_id == attempt.test_id)
        .ok_or_else(|| LifecycleError::not_found("Question not found"))?;

    if selected_option as usize >= question.option_count() {
        return Err(LifecycleError::validation(format!(
            "selected_option must be below {}",
            question.option_count()
        )));
    }

    let answer = NewAnswer {
        id: Uuid::new_v4().to_string(),
        attempt_id: attempt.id.clone(),
        question_id: question.id.clone(),
        selected_option,
        is_correct: selected_option == question.correct_option,
        time_spent_seconds,
        answered_at: engine.now(),
    };

    match store.upsert_answer(answer).await? {
        Some(saved) => {
            tracing::debug!(attempt_id, question_id, is_correct = saved.is_correct, "Answer recorded");
            Ok(saved)
        }
        None => Err(finalized_meanwhile(engine, attempt_id).await),
    }
}

pub(crate) async fn submit_attempt(
    engine: &Engine,
    attempt_id: &str,
    actor: &Actor,
) -> LifecycleResult<Attempt> {
    let attempt = load_owned_attempt(engine, attempt_id, actor).await?;
    if attempt.status != AttemptStatus::InProgress {
        return Err(LifecycleError::state(ATTEMPT_FINALIZED, attempt.status));
    }

    let Some(finished) =
        finalize(engine, &attempt, AttemptStatus::Completed, engine.now()).await?
    else {
        return Err(finalized_meanwhile(engine, attempt_id).await);
    };

    metrics::counter!(ATTEMPTS_SUBMITTED).increment(1);
    tracing::info!(
        attempt_id,
        test_id = %finished.test_id,
        score = finished.score,
        total_points = finished.total_points,
        "Attempt submitted"
    );
    emit(engine, completed_event(&finished)).await;
    publish_stats(engine, &finished.test_id).await;

    Ok(finished)
}

/// Finalizes every in-progress attempt of `test_id` as timed out. Attempts that
/// fail are logged and skipped; attempts submitted concurrently are left alone.
pub(crate) async fn timeout_sweep(engine: &Engine, test_id: &str) -> LifecycleResult<SweepReport> {
    let open = engine.store().list_attempts(test_id, Some(AttemptStatus::InProgress)).await?;
    let now = engine.now();
    let mut report = SweepReport::default();

    for attempt in open {
        match finalize(engine, &attempt, AttemptStatus::TimedOut, now).await {
            Ok(Some(finished)) => {
                report.timed_out += 1;
                emit(engine, completed_event(&finished)).await;
            }
            Ok(None) => {}
            Err(err) => {
                report.failures += 1;
                tracing::error!(
                    test_id,
                    attempt_id = %attempt.id,
                    error = %err,
                    "Failed to time out attempt"
                );
            }
        }
    }

    if report.timed_out > 0 {
        metrics::counter!(ATTEMPTS_TIMED_OUT).increment(report.timed_out as u64);
        tracing::info!(test_id, timed_out = report.timed_out, "Timed out in-progress attempts");
        publish_stats(engine, test_id).await;
    }

    Ok(report)
}

pub(crate) async fn get_attempt(
    engine: &Engine,
    attempt_id: &str,
    actor: &Actor,
) -> LifecycleResult<AttemptDetails> {
    let attempt = engine
        .store()
        .find_attempt(attempt_id)
        .await?
        .filter(|attempt| actor.is_admin() || attempt.user_id == actor.user_id)
        .ok_or_else(|| LifecycleError::not_found("Attempt not found"))?;
    let answers = engine.store().list_answers(&attempt.id).await?;

    Ok(AttemptDetails { attempt, answers })
}

/// The caller's most recent attempt for a test, if any.
pub(crate) async fn find_for_user(
    engine: &Engine,
    test_id: &str,
    actor: &Actor,
) -> LifecycleResult<Option<Attempt>> {
    load_test(engine, test_id).await?;
    let attempts = engine.store().list_attempts_for_user(test_id, &actor.user_id).await?;
    Ok(attempts.into_iter().next())
}

async fn load_owned_attempt(
    engine: &Engine,
    attempt_id: &str,
    actor: &Actor,
) -> LifecycleResult<Attempt> {
    engine
        .store()
        .find_attempt(attempt_id)
        .await?
        .filter(|attempt| attempt.user_id == actor.user_id)
        .ok_or_else(|| LifecycleError::not_found("Attempt not found"))
}

async fn finalize(
    engine: &Engine,
    attempt: &Attempt,
    status: AttemptStatus,
    ended_at: PrimitiveDateTime,
) -> LifecycleResult<Option<Attempt>> {
    Ok(engine.store().finalize_attempt(&attempt.id, FinalizeAttempt { status, ended_at }).await?)
}

/// Error for a conditional write on an attempt that lost to a concurrent finalize.
async fn finalized_meanwhile(engine: &Engine, attempt_id: &str) -> LifecycleError {
    match engine.store().find_attempt(attempt_id).await {
        Ok(Some(current)) => LifecycleError::state(ATTEMPT_FINALIZED, current.status),
        Ok(None) => LifecycleError::not_found("Attempt not found"),
        Err(err) => err.into(),
    }
}

fn completed_event(attempt: &Attempt) -> LifecycleEvent {
    LifecycleEvent::ParticipantCompleted {
        test_id: attempt.test_id.clone(),
        attempt_id: attempt.id.clone(),
        user_id: attempt.user_id.clone(),
        status: attempt.status,
        score: attempt.score,
        total_points: attempt.total_points,
    }
}

#[cfg(test)]
mod tests;
