pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use crate::core::{bootstrap, config::Settings, shutdown, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = bootstrap::build_state(settings).await?;
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    let (trigger, shutdown_rx) = shutdown::channel();
    let checker = if state.settings().checker().in_process {
        let period = Duration::from_secs(state.settings().checker().interval_seconds);
        Some(tokio::spawn(tasks::scheduler::checker_loop(
            state.engine().clone(),
            period,
            shutdown_rx,
        )))
    } else {
        tracing::info!("Transition checker disabled in this process; run the worker binary");
        None
    };

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        store = state.settings().store().backend.as_str(),
        "Proctor API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(shutdown::shutdown_signal()).await;

    trigger.fire();
    if let Some(handle) = checker {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Transition checker join failed");
        }
    }
    bootstrap::teardown(&state).await;

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = bootstrap::build_state(settings).await?;
    let result = tasks::scheduler::run(state.clone()).await;

    bootstrap::teardown(&state).await;

    result?;

    Ok(())
}
