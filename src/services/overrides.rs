//! Administrator-triggered transitions outside the clock-driven flow.

use time::PrimitiveDateTime;

use crate::core::time::format_primitive;
use crate::db::models::Test;
use crate::db::types::TestStatus;
use crate::repositories::TestDetails;
use crate::services::errors::{LifecycleError, LifecycleResult};
use crate::services::events::TransitionTrigger;
use crate::services::lifecycle::{self, load_test, Completion};
use crate::services::timing::compute_scheduled_end;
use crate::services::Engine;

const FORCE_START_REQUIRES: &str = "test must be scheduled to force-start";
const FORCE_END_REQUIRES: &str = "test must be active to force-end";
const RESCHEDULE_REQUIRES: &str = "only scheduled tests can be rescheduled";

pub(crate) async fn force_start(engine: &Engine, test_id: &str) -> LifecycleResult<Test> {
    let test = load_test(engine, test_id).await?;
    if test.status != TestStatus::Scheduled {
        return Err(LifecycleError::state(FORCE_START_REQUIRES, test.status));
    }

    // Starting early pulls the whole window forward so attempts and the end
    // scan agree with the forced start.
    let now = engine.now();
    if now < test.scheduled_start {
        let realigned = engine
            .store()
            .update_test(test_id, TestStatus::Scheduled, window_from(&test, now, now))
            .await?;
        if realigned.is_none() {
            return Err(lost_race(engine, test_id, FORCE_START_REQUIRES).await);
        }
    }

    match lifecycle::activate(engine, test_id, TransitionTrigger::Manual).await? {
        Some(active) => Ok(active),
        None => Err(lost_race(engine, test_id, FORCE_START_REQUIRES).await),
    }
}

pub(crate) async fn force_end(engine: &Engine, test_id: &str) -> LifecycleResult<Completion> {
    let test = load_test(engine, test_id).await?;
    if test.status != TestStatus::Active {
        return Err(LifecycleError::state(FORCE_END_REQUIRES, test.status));
    }

    match lifecycle::complete(engine, test_id, TransitionTrigger::Manual).await? {
        Some(completion) => Ok(completion),
        None => Err(lost_race(engine, test_id, FORCE_END_REQUIRES).await),
    }
}

pub(crate) async fn reschedule(
    engine: &Engine,
    test_id: &str,
    new_start: PrimitiveDateTime,
) -> LifecycleResult<Test> {
    let test = load_test(engine, test_id).await?;
    if test.status != TestStatus::Scheduled {
        return Err(LifecycleError::state(RESCHEDULE_REQUIRES, test.status));
    }

    let updated = engine
        .store()
        .update_test(test_id, TestStatus::Scheduled, window_from(&test, new_start, engine.now()))
        .await?;

    match updated {
        Some(test) => {
            tracing::info!(
                test_id,
                scheduled_start = %format_primitive(test.scheduled_start),
                scheduled_end = %format_primitive(test.scheduled_end),
                "Test rescheduled"
            );
            Ok(test)
        }
        None => Err(lost_race(engine, test_id, RESCHEDULE_REQUIRES).await),
    }
}

fn window_from(test: &Test, start: PrimitiveDateTime, now: PrimitiveDateTime) -> TestDetails {
    TestDetails {
        title: test.title.clone(),
        subject: test.subject.clone(),
        duration_minutes: test.duration_minutes,
        scheduled_start: start,
        scheduled_end: compute_scheduled_end(start, test.duration_minutes),
        updated_at: now,
    }
}

/// The conditional write lost to a concurrent transition; report where the
/// test ended up.
async fn lost_race(engine: &Engine, test_id: &str, message: &str) -> LifecycleError {
    match engine.store().find_test(test_id).await {
        Ok(Some(current)) => LifecycleError::state(message, current.status),
        Ok(None) => LifecycleError::not_found("Test not found"),
        Err(err) => err.into(),
    }
}
