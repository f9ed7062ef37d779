use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::Engine;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    engine: Engine,
    redis: Option<RedisHandle>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, engine: Engine, redis: Option<RedisHandle>) -> Self {
        Self { inner: Arc::new(InnerState { settings, engine, redis }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Present only when events go through Redis.
    pub(crate) fn redis(&self) -> Option<&RedisHandle> {
        self.inner.redis.as_ref()
    }
}
