use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use time::{Duration, PrimitiveDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::api;
use crate::core::clock::ManualClock;
use crate::core::{config::Settings, security, state::AppState};
use crate::db::models::{Question, Test};
use crate::db::types::{TestStatus, UserRole};
use crate::repositories::memory::MemoryStore;
use crate::repositories::{NewQuestion, NewTest, Store};
use crate::services::events::BroadcastPublisher;
use crate::services::{Actor, Engine};

const TEST_SECRET_KEY: &str = "test-secret";

/// Engine over an in-memory store, with handles to drive the clock and watch
/// published events.
pub(crate) struct TestEngine {
    pub(crate) engine: Engine,
    pub(crate) clock: ManualClock,
    pub(crate) events: BroadcastPublisher,
}

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) clock: ManualClock,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("PROCTOR_ENV", "test");
    std::env::set_var("PROCTOR_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("STORE_BACKEND", "memory");
    std::env::set_var("EVENTS_BACKEND", "broadcast");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("REDIS_PASSWORD");
}

pub(crate) fn test_engine(at: PrimitiveDateTime) -> TestEngine {
    engine_with_store(Arc::new(MemoryStore::new()), at)
}

pub(crate) fn engine_with_store(store: Arc<dyn Store>, at: PrimitiveDateTime) -> TestEngine {
    let clock = ManualClock::new(at);
    let events = BroadcastPublisher::new(64);
    let engine = Engine::new(store, Arc::new(events.clone()), Arc::new(clock.clone()));
    TestEngine { engine, clock, events }
}

pub(crate) fn memory_state(
    settings: Settings,
    at: PrimitiveDateTime,
) -> (AppState, ManualClock, BroadcastPublisher) {
    let TestEngine { engine, clock, events } = test_engine(at);
    (AppState::new(settings, engine, None), clock, events)
}

pub(crate) async fn setup_test_context() -> TestContext {
    setup_test_context_at(time::macros::datetime!(2025-03-01 10:00)).await
}

pub(crate) async fn setup_test_context_at(at: PrimitiveDateTime) -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let (state, clock, _events) = memory_state(settings, at);
    let app = api::router::router(state.clone());

    TestContext { state, app, clock, _guard: guard }
}

/// Inserts a test directly through the store, bypassing publish rules.
/// Each question gets four options and the given `(correct_option, points)`.
pub(crate) async fn seed_test(
    engine: &Engine,
    status: TestStatus,
    start: PrimitiveDateTime,
    duration_minutes: i32,
    questions: &[(i32, i32)],
) -> (Test, Vec<Question>) {
    let test_id = Uuid::new_v4().to_string();
    let rows = questions
        .iter()
        .enumerate()
        .map(|(index, (correct_option, points))| NewQuestion {
            id: Uuid::new_v4().to_string(),
            test_id: test_id.clone(),
            prompt: format!("Question {}", index + 1),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_option: *correct_option,
            points: *points,
            order_index: index as i32,
            created_at: start,
        })
        .collect();

    let test = engine
        .store()
        .create_test(
            NewTest {
                id: test_id.clone(),
                title: "Seeded test".to_string(),
                subject: "General".to_string(),
                duration_minutes,
                scheduled_start: start,
                scheduled_end: start + Duration::minutes(duration_minutes as i64),
                status,
                created_by: "admin-seed".to_string(),
                created_at: start - Duration::days(1),
            },
            rows,
        )
        .await
        .expect("seed test");
    let questions = engine.store().list_questions(&test_id).await.expect("seed questions");

    (test, questions)
}

pub(crate) fn student(user_id: &str) -> Actor {
    Actor { user_id: user_id.to_string(), role: UserRole::Student }
}

pub(crate) fn admin(user_id: &str) -> Actor {
    Actor { user_id: user_id.to_string(), role: UserRole::Admin }
}

pub(crate) fn bearer_token(user_id: &str, role: UserRole, settings: &Settings) -> String {
    security::create_access_token(user_id, role, settings, None).expect("token")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
