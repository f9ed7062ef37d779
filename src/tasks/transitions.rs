//! One tick of the clock-driven transition checker.
//!
//! Detection is "start <= now" / "end <= now" filtered only by status, so a
//! test is picked up on the next tick no matter how long the checker was down.
//! Every transition is a conditional write, which makes re-running a tick a
//! no-op for tests that already moved.

use std::time::Instant;

use crate::core::metrics::{TICK_DURATION, TICK_FAILURES};
use crate::services::attempts;
use crate::services::events::TransitionTrigger;
use crate::services::lifecycle;
use crate::services::Engine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TickReport {
    pub(crate) activated: usize,
    pub(crate) completed: usize,
    pub(crate) timed_out: usize,
    pub(crate) failures: usize,
}

impl TickReport {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) async fn tick(engine: &Engine) -> TickReport {
    let started = Instant::now();
    let mut report = TickReport::default();

    start_due_tests(engine, &mut report).await;
    end_due_tests(engine, &mut report).await;
    sweep_orphaned_attempts(engine, &mut report).await;

    metrics::histogram!(TICK_DURATION).record(started.elapsed().as_secs_f64());
    if report.failures > 0 {
        metrics::counter!(TICK_FAILURES).increment(report.failures as u64);
    }
    if !report.is_empty() {
        tracing::info!(
            activated = report.activated,
            completed = report.completed,
            timed_out = report.timed_out,
            failures = report.failures,
            "Transition tick finished"
        );
    }

    report
}

async fn start_due_tests(engine: &Engine, report: &mut TickReport) {
    let due = match engine.store().list_due_to_start(engine.now()).await {
        Ok(due) => due,
        Err(err) => {
            report.failures += 1;
            tracing::error!(error = %err, "Failed to list tests due to start");
            return;
        }
    };

    for test in due {
        match lifecycle::activate(engine, &test.id, TransitionTrigger::Clock).await {
            Ok(Some(_)) => report.activated += 1,
            Ok(None) => {}
            Err(err) => {
                report.failures += 1;
                tracing::error!(test_id = %test.id, error = %err, "Failed to activate test");
            }
        }
    }
}

async fn end_due_tests(engine: &Engine, report: &mut TickReport) {
    let due = match engine.store().list_due_to_end(engine.now()).await {
        Ok(due) => due,
        Err(err) => {
            report.failures += 1;
            tracing::error!(error = %err, "Failed to list tests due to end");
            return;
        }
    };

    for test in due {
        match lifecycle::complete(engine, &test.id, TransitionTrigger::Clock).await {
            Ok(Some(completion)) => {
                report.completed += 1;
                report.timed_out += completion.sweep.timed_out;
                report.failures += completion.sweep.failures;
            }
            Ok(None) => {}
            Err(err) => {
                report.failures += 1;
                tracing::error!(test_id = %test.id, error = %err, "Failed to complete test");
            }
        }
    }
}

/// Completed tests can still own in-progress attempts when a sweep failed
/// part-way or a start raced the end transition.
async fn sweep_orphaned_attempts(engine: &Engine, report: &mut TickReport) {
    let test_ids = match engine.store().list_completed_with_open_attempts().await {
        Ok(ids) => ids,
        Err(err) => {
            report.failures += 1;
            tracing::error!(error = %err, "Failed to list completed tests with open attempts");
            return;
        }
    };

    for test_id in test_ids {
        match attempts::timeout_sweep(engine, &test_id).await {
            Ok(sweep) => {
                report.timed_out += sweep.timed_out;
                report.failures += sweep.failures;
            }
            Err(err) => {
                report.failures += 1;
                tracing::error!(test_id = %test_id, error = %err, "Failed to sweep open attempts");
            }
        }
    }
}
