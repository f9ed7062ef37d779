use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const TESTS_ACTIVATED: &str = "lifecycle_tests_activated_total";
pub(crate) const TESTS_COMPLETED: &str = "lifecycle_tests_completed_total";
pub(crate) const ATTEMPTS_STARTED: &str = "lifecycle_attempts_started_total";
pub(crate) const ATTEMPTS_SUBMITTED: &str = "lifecycle_attempts_submitted_total";
pub(crate) const ATTEMPTS_TIMED_OUT: &str = "lifecycle_attempts_timed_out_total";
pub(crate) const TICK_FAILURES: &str = "lifecycle_tick_failures_total";
pub(crate) const TICK_DURATION: &str = "lifecycle_tick_duration_seconds";
pub(crate) const EVENTS_DROPPED: &str = "lifecycle_events_dropped_total";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
