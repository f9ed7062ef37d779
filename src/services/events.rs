//! Fire-and-forget lifecycle events for the real-time layer.
//!
//! The engine only produces events. A failed publish is logged and counted,
//! never surfaced to the operation that caused it.

use async_trait::async_trait;
use redis::RedisError;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::core::config::RedisSettings;
use crate::core::metrics::EVENTS_DROPPED;
use crate::core::redis::RedisHandle;
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::AttemptCounts;
use crate::services::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TransitionTrigger {
    Clock,
    Manual,
}

impl TransitionTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Clock => "clock",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum LifecycleEvent {
    TestTransitioned {
        test_id: String,
        from: TestStatus,
        to: TestStatus,
        at: String,
        trigger: TransitionTrigger,
    },
    ParticipantJoined {
        test_id: String,
        attempt_id: String,
        user_id: String,
    },
    ParticipantCompleted {
        test_id: String,
        attempt_id: String,
        user_id: String,
        status: AttemptStatus,
        score: i32,
        total_points: i32,
    },
    StatsChanged {
        test_id: String,
        in_progress: i64,
        completed: i64,
        timed_out: i64,
        participants: i64,
    },
}

impl LifecycleEvent {
    pub(crate) fn stats(test_id: &str, counts: AttemptCounts) -> Self {
        Self::StatsChanged {
            test_id: test_id.to_string(),
            in_progress: counts.in_progress,
            completed: counts.completed,
            timed_out: counts.timed_out,
            participants: counts.participants(),
        }
    }

    pub(crate) fn test_id(&self) -> &str {
        match self {
            Self::TestTransitioned { test_id, .. }
            | Self::ParticipantJoined { test_id, .. }
            | Self::ParticipantCompleted { test_id, .. }
            | Self::StatsChanged { test_id, .. } => test_id,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum PublishError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("redis publish failed: {0}")]
    Redis(#[from] RedisError),
    #[error("redis is not connected")]
    Disconnected,
}

#[async_trait]
pub(crate) trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), PublishError>;
}

/// In-process fan-out. Sending with no subscribers is not an error.
#[derive(Clone)]
pub(crate) struct BroadcastPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastPublisher {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), PublishError> {
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(test_id = %event.test_id(), "No subscribers for lifecycle event");
        }
        Ok(())
    }
}

/// JSON `PUBLISH` to `{prefix}:{test_id}`.
#[derive(Clone)]
pub(crate) struct RedisPublisher {
    redis: RedisHandle,
    settings: RedisSettings,
}

impl RedisPublisher {
    pub(crate) fn new(redis: RedisHandle, settings: RedisSettings) -> Self {
        Self { redis, settings }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, event: &LifecycleEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        let channel = self.settings.channel_for(event.test_id());

        match self.redis.publish(&channel, &payload).await? {
            Some(receivers) => {
                tracing::debug!(channel = %channel, receivers, "Lifecycle event published");
                Ok(())
            }
            None => Err(PublishError::Disconnected),
        }
    }
}

pub(crate) async fn emit(engine: &Engine, event: LifecycleEvent) {
    if let Err(err) = engine.events().publish(&event).await {
        metrics::counter!(EVENTS_DROPPED).increment(1);
        tracing::warn!(
            error = %err,
            test_id = %event.test_id(),
            "Failed to publish lifecycle event"
        );
    }
}
