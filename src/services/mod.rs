//! The lifecycle engine: attempt guards, scoring, transitions, overrides and
//! the session aggregate. Everything here talks to the outside world through
//! the [`Engine`] handle, so the same code runs against Postgres in
//! production and against the in-memory store with a manual clock in tests.

pub(crate) mod attempts;
pub(crate) mod errors;
pub(crate) mod events;
pub(crate) mod lifecycle;
pub(crate) mod overrides;
pub(crate) mod scheduling;
pub(crate) mod scoring;
pub(crate) mod sessions;
pub(crate) mod timing;

use std::sync::Arc;

use time::PrimitiveDateTime;

use crate::core::clock::Clock;
use crate::db::types::UserRole;
use crate::repositories::Store;
use crate::services::events::EventPublisher;

#[derive(Clone)]
pub(crate) struct Engine {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, events, clock }
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub(crate) fn events(&self) -> &dyn EventPublisher {
        self.events.as_ref()
    }

    pub(crate) fn now(&self) -> PrimitiveDateTime {
        self.clock.now()
    }
}

/// Caller identity as resolved by the auth guard.
#[derive(Debug, Clone)]
pub(crate) struct Actor {
    pub(crate) user_id: String,
    pub(crate) role: UserRole,
}

impl Actor {
    pub(crate) fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
