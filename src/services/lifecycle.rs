//! The two test transitions. The clock checker and the manual overrides both
//! go through here, so there is a single path for "test becomes active" and
//! "test becomes completed".

use crate::core::metrics::{TESTS_ACTIVATED, TESTS_COMPLETED};
use crate::core::time::format_primitive;
use crate::db::models::Test;
use crate::db::types::TestStatus;
use crate::services::attempts::{self, SweepReport};
use crate::services::errors::{LifecycleError, LifecycleResult};
use crate::services::events::{emit, LifecycleEvent, TransitionTrigger};
use crate::services::Engine;

#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub(crate) test: Test,
    pub(crate) sweep: SweepReport,
}

pub(crate) async fn load_test(engine: &Engine, test_id: &str) -> LifecycleResult<Test> {
    engine
        .store()
        .find_test(test_id)
        .await?
        .ok_or_else(|| LifecycleError::not_found("Test not found"))
}

/// `scheduled -> active`. `None` when the test was no longer scheduled.
pub(crate) async fn activate(
    engine: &Engine,
    test_id: &str,
    trigger: TransitionTrigger,
) -> LifecycleResult<Option<Test>> {
    let now = engine.now();
    let Some(test) = engine
        .store()
        .transition_test(test_id, TestStatus::Scheduled, TestStatus::Active, now)
        .await?
    else {
        return Ok(None);
    };

    metrics::counter!(TESTS_ACTIVATED, "trigger" => trigger.as_str()).increment(1);
    tracing::info!(
        test_id,
        trigger = trigger.as_str(),
        scheduled_start = %format_primitive(test.scheduled_start),
        "Test activated"
    );
    emit(engine, transitioned(&test, TestStatus::Scheduled, trigger)).await;

    Ok(Some(test))
}

/// `active -> completed`, followed by the timeout sweep. A sweep that cannot
/// even list its attempts is logged and reported as a failure; the test stays
/// completed and the checker picks the leftovers up on a later tick.
pub(crate) async fn complete(
    engine: &Engine,
    test_id: &str,
    trigger: TransitionTrigger,
) -> LifecycleResult<Option<Completion>> {
    let now = engine.now();
    let Some(test) = engine
        .store()
        .transition_test(test_id, TestStatus::Active, TestStatus::Completed, now)
        .await?
    else {
        return Ok(None);
    };

    metrics::counter!(TESTS_COMPLETED, "trigger" => trigger.as_str()).increment(1);
    tracing::info!(
        test_id,
        trigger = trigger.as_str(),
        scheduled_end = %format_primitive(test.scheduled_end),
        "Test completed"
    );
    emit(engine, transitioned(&test, TestStatus::Active, trigger)).await;

    let sweep = match attempts::timeout_sweep(engine, test_id).await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(test_id, error = %err, "Timeout sweep failed after test completion");
            SweepReport { timed_out: 0, failures: 1 }
        }
    };

    Ok(Some(Completion { test, sweep }))
}

fn transitioned(test: &Test, from: TestStatus, trigger: TransitionTrigger) -> LifecycleEvent {
    LifecycleEvent::TestTransitioned {
        test_id: test.id.clone(),
        from,
        to: test.status,
        at: format_primitive(test.updated_at),
        trigger,
    }
}
