use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client, RedisError};
use tokio::sync::{Mutex, RwLock};

/// Minimum spacing between connection attempts made on behalf of callers.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
    reconnect: Arc<Mutex<ReconnectState>>,
    reconnect_interval: Duration,
}

#[derive(Debug, Default)]
struct ReconnectState {
    last_attempt: Option<Instant>,
    in_flight: bool,
    closed: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self {
            url,
            manager: Arc::new(RwLock::new(None)),
            reconnect: Arc::new(Mutex::new(ReconnectState::default())),
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        {
            let mut state = self.reconnect.lock().await;
            state.last_attempt = Some(Instant::now());
            state.closed = false;
        }
        self.open().await
    }

    async fn open(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        if !self.reconnect.lock().await.closed {
            *guard = Some(manager);
        }
        Ok(())
    }

    /// Drops the connection and stops callers from reopening it.
    pub(crate) async fn disconnect(&self) {
        self.reconnect.lock().await.closed = true;
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut manager) = self.connection().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Publishes `payload` on `channel`. Returns `Ok(None)` when no connection is
    /// held, otherwise the number of subscribers that received the message.
    pub(crate) async fn publish(
        &self,
        channel: &str,
        payload: &str,
    ) -> Result<Option<i64>, RedisError> {
        let Some(mut manager) = self.connection().await else {
            return Ok(None);
        };

        let receivers: i64 = manager.publish(channel, payload).await?;
        Ok(Some(receivers))
    }

    /// The live manager, if any. Without one, schedules a background connect
    /// at most once per interval and answers `None` for this call.
    async fn connection(&self) -> Option<ConnectionManager> {
        if let Some(manager) = self.manager.read().await.clone() {
            return Some(manager);
        }

        if self.claim_reconnect().await {
            let handle = self.clone();
            tokio::spawn(async move {
                match handle.open().await {
                    Ok(()) => tracing::info!("Redis reconnected"),
                    Err(err) => tracing::warn!(error = %err, "Redis reconnect failed"),
                }
                handle.reconnect.lock().await.in_flight = false;
            });
        }
        None
    }

    async fn claim_reconnect(&self) -> bool {
        let mut state = self.reconnect.lock().await;
        if state.closed || state.in_flight {
            return false;
        }
        if state.last_attempt.is_some_and(|at| at.elapsed() < self.reconnect_interval) {
            return false;
        }
        state.in_flight = true;
        state.last_attempt = Some(Instant::now());
        true
    }

    #[cfg(test)]
    fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RedisHandle, RedisHealth};

    // Nothing listens on port 1; connects are refused straight away.
    const UNREACHABLE: &str = "redis://127.0.0.1:1/0";

    #[tokio::test]
    async fn unconnected_handle_reports_disconnected() {
        let redis = RedisHandle::new(UNREACHABLE.to_string());

        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
        assert_eq!(redis.publish("proctor:test:t1", "{}").await.expect("publish"), None);
    }

    #[tokio::test]
    async fn publish_without_connection_schedules_one_reconnect() {
        let redis = RedisHandle::new(UNREACHABLE.to_string());

        assert_eq!(redis.publish("proctor:test:t1", "{}").await.expect("publish"), None);

        let state = redis.reconnect.lock().await;
        assert!(state.in_flight || state.last_attempt.is_some());
        drop(state);
        assert!(!redis.claim_reconnect().await);
    }

    #[tokio::test]
    async fn reconnect_is_retried_after_the_interval() {
        let redis = RedisHandle::new(UNREACHABLE.to_string())
            .with_reconnect_interval(Duration::from_millis(20));

        assert!(redis.claim_reconnect().await);
        redis.reconnect.lock().await.in_flight = false;
        assert!(!redis.claim_reconnect().await);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(redis.claim_reconnect().await);
    }

    #[tokio::test]
    async fn recent_connect_defers_the_next_attempt() {
        let redis = RedisHandle::new(UNREACHABLE.to_string());
        redis.reconnect.lock().await.last_attempt = Some(std::time::Instant::now());

        assert!(!redis.claim_reconnect().await);
    }

    #[tokio::test]
    async fn disconnected_handle_stays_closed() {
        let redis = RedisHandle::new(UNREACHABLE.to_string())
            .with_reconnect_interval(Duration::ZERO);

        redis.disconnect().await;

        assert!(!redis.claim_reconnect().await);
        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
    }
}
