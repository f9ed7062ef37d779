use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown;
use crate::core::state::AppState;
use crate::services::Engine;
use crate::tasks::transitions;

/// Worker entry point: runs the checker until SIGINT/SIGTERM.
pub(crate) async fn run(state: AppState) -> Result<()> {
    let (trigger, shutdown_rx) = shutdown::channel();
    let period = Duration::from_secs(state.settings().checker().interval_seconds);

    let handle = tokio::spawn(checker_loop(state.engine().clone(), period, shutdown_rx));

    shutdown::shutdown_signal().await;
    trigger.fire();

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Transition checker join failed");
    }

    Ok(())
}

/// Ticks immediately, then every `period`, until `shutdown` flips.
pub(crate) async fn checker_loop(
    engine: Engine,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_seconds = period.as_secs(), "Transition checker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                transitions::tick(&engine).await;
            }
        }
    }

    tracing::info!("Transition checker stopped");
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::db::types::TestStatus;
    use crate::test_support::{seed_test, test_engine};

    #[tokio::test]
    async fn loop_ticks_until_shutdown() {
        let ctx = test_engine(datetime!(2025-03-01 10:00));
        let (test, _) =
            seed_test(&ctx.engine, TestStatus::Scheduled, datetime!(2025-03-01 09:00), 30, &[(1, 1)])
                .await;
        let (trigger, rx) = shutdown::channel();
        let mut events = ctx.events.subscribe();

        let handle =
            tokio::spawn(checker_loop(ctx.engine.clone(), Duration::from_millis(10), rx));
        events.recv().await.expect("first tick publishes a transition");
        trigger.fire();
        handle.await.expect("checker stops");

        let test = ctx.engine.store().find_test(&test.id).await.unwrap().unwrap();
        assert_eq!(test.status, TestStatus::Completed);
    }
}
