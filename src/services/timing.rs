use time::{Duration, PrimitiveDateTime};

use crate::db::models::Test;
use crate::db::types::TestStatus;
use crate::services::errors::{LifecycleError, LifecycleResult};

pub(crate) const MAX_DURATION_MINUTES: i32 = 24 * 60;

pub(crate) fn validate_duration(duration_minutes: i32) -> LifecycleResult<()> {
    if !(1..=MAX_DURATION_MINUTES).contains(&duration_minutes) {
        return Err(LifecycleError::validation(format!(
            "duration_minutes must be between 1 and {MAX_DURATION_MINUTES}"
        )));
    }
    Ok(())
}

pub(crate) fn compute_scheduled_end(
    scheduled_start: PrimitiveDateTime,
    duration_minutes: i32,
) -> PrimitiveDateTime {
    scheduled_start + Duration::minutes(i64::from(duration_minutes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WindowPosition {
    NotOpen,
    Open,
    Closed,
}

/// Where `now` falls relative to `[scheduled_start, scheduled_end]`; both
/// bounds are inclusive.
pub(crate) fn window_position(test: &Test, now: PrimitiveDateTime) -> WindowPosition {
    if now < test.scheduled_start {
        WindowPosition::NotOpen
    } else if now > test.scheduled_end {
        WindowPosition::Closed
    } else {
        WindowPosition::Open
    }
}

pub(crate) fn seconds_remaining(test: &Test, now: PrimitiveDateTime) -> Option<i64> {
    if test.status != TestStatus::Active {
        return None;
    }
    Some((test.scheduled_end - now).whole_seconds().max(0))
}
