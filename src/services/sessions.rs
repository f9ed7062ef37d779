use serde::Serialize;
use time::PrimitiveDateTime;

use crate::db::models::Test;
use crate::db::types::TestStatus;
use crate::repositories::AttemptCounts;
use crate::services::errors::LifecycleResult;
use crate::services::events::{emit, LifecycleEvent};
use crate::services::lifecycle::load_test;
use crate::services::timing::seconds_remaining;
use crate::services::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SessionStatus {
    Waiting,
    Active,
    Ended,
}

pub(crate) fn session_status(test_status: TestStatus, counts: &AttemptCounts) -> SessionStatus {
    if test_status == TestStatus::Completed {
        SessionStatus::Ended
    } else if counts.participants() > 0 {
        SessionStatus::Active
    } else {
        SessionStatus::Waiting
    }
}

/// Point-in-time view of a test, recomputed from the store on every call.
#[derive(Debug, Clone)]
pub(crate) struct SessionSummary {
    pub(crate) test: Test,
    pub(crate) session_status: SessionStatus,
    pub(crate) counts: AttemptCounts,
    pub(crate) seconds_remaining: Option<i64>,
    pub(crate) computed_at: PrimitiveDateTime,
}

pub(crate) async fn summarize(engine: &Engine, test_id: &str) -> LifecycleResult<SessionSummary> {
    let test = load_test(engine, test_id).await?;
    let counts = engine.store().count_attempts(test_id).await?;
    let now = engine.now();

    Ok(SessionSummary {
        session_status: session_status(test.status, &counts),
        seconds_remaining: seconds_remaining(&test, now),
        counts,
        test,
        computed_at: now,
    })
}

pub(crate) async fn publish_stats(engine: &Engine, test_id: &str) {
    match engine.store().count_attempts(test_id).await {
        Ok(counts) => emit(engine, LifecycleEvent::stats(test_id, counts)).await,
        Err(err) => tracing::warn!(test_id, error = %err, "Failed to count attempts for stats"),
    }
}
