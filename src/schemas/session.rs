use serde::Serialize;

use crate::core::time::{format_optional, format_primitive};
use crate::db::types::TestStatus;
use crate::schemas::test::TestResponse;
use crate::services::lifecycle::Completion;
use crate::services::sessions::{SessionStatus, SessionSummary};

#[derive(Debug, Serialize)]
pub(crate) struct SessionCounts {
    pub(crate) in_progress: i64,
    pub(crate) completed: i64,
    pub(crate) timed_out: i64,
    pub(crate) participants: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) test_id: String,
    pub(crate) title: String,
    pub(crate) test_status: TestStatus,
    pub(crate) session_status: SessionStatus,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_start: String,
    pub(crate) scheduled_end: String,
    pub(crate) actual_started_at: Option<String>,
    pub(crate) actual_ended_at: Option<String>,
    pub(crate) counts: SessionCounts,
    pub(crate) seconds_remaining: Option<i64>,
    pub(crate) computed_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ForceEndResponse {
    pub(crate) test: TestResponse,
    pub(crate) timed_out: usize,
    pub(crate) sweep_failures: usize,
}

impl From<SessionSummary> for SessionResponse {
    fn from(summary: SessionSummary) -> Self {
        let SessionSummary { test, session_status, counts, seconds_remaining, computed_at } =
            summary;
        Self {
            test_id: test.id,
            title: test.title,
            test_status: test.status,
            session_status,
            duration_minutes: test.duration_minutes,
            scheduled_start: format_primitive(test.scheduled_start),
            scheduled_end: format_primitive(test.scheduled_end),
            actual_started_at: format_optional(test.actual_started_at),
            actual_ended_at: format_optional(test.actual_ended_at),
            counts: SessionCounts {
                in_progress: counts.in_progress,
                completed: counts.completed,
                timed_out: counts.timed_out,
                participants: counts.participants(),
            },
            seconds_remaining,
            computed_at: format_primitive(computed_at),
        }
    }
}

impl From<Completion> for ForceEndResponse {
    fn from(completion: Completion) -> Self {
        Self {
            test: TestResponse::from_test(completion.test),
            timed_out: completion.sweep.timed_out,
            sweep_failures: completion.sweep.failures,
        }
    }
}
