use std::sync::Arc;

use anyhow::Context;

use crate::core::clock::SystemClock;
use crate::core::config::{EventsBackend, Settings, StoreBackend};
use crate::core::redis::RedisHandle;
use crate::core::state::AppState;
use crate::db;
use crate::repositories::memory::MemoryStore;
use crate::repositories::postgres::PgStore;
use crate::repositories::Store;
use crate::services::events::{BroadcastPublisher, EventPublisher, RedisPublisher};
use crate::services::Engine;

/// Composition root shared by the API and the worker binaries.
pub(crate) async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let store: Arc<dyn Store> = match settings.store().backend {
        StoreBackend::Postgres => {
            let pool = db::init_pool(&settings).await.context("failed to connect to Postgres")?;
            db::run_migrations(&pool).await.context("failed to apply migrations")?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let (events, redis): (Arc<dyn EventPublisher>, Option<RedisHandle>) =
        match settings.events().backend {
            EventsBackend::Redis => {
                let redis = RedisHandle::new(settings.redis().redis_url());
                if let Err(err) = redis.connect().await {
                    tracing::error!(
                        error = %err,
                        "Failed to connect to Redis; events are dropped until a reconnect succeeds"
                    );
                } else {
                    tracing::info!("Redis connected successfully");
                }
                let publisher = RedisPublisher::new(redis.clone(), settings.redis().clone());
                (Arc::new(publisher), Some(redis))
            }
            EventsBackend::Broadcast => {
                let publisher = BroadcastPublisher::new(settings.events().broadcast_capacity);
                (Arc::new(publisher), None)
            }
        };

    tracing::info!(
        store = settings.store().backend.as_str(),
        checker_in_process = settings.checker().in_process,
        "Lifecycle engine ready"
    );

    let engine = Engine::new(store, events, Arc::new(SystemClock));
    Ok(AppState::new(settings, engine, redis))
}

pub(crate) async fn teardown(state: &AppState) {
    if let Some(redis) = state.redis() {
        redis.disconnect().await;
        tracing::info!("Redis disconnected");
    }
}
