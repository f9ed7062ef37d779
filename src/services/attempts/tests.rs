use std::sync::Arc;

use async_trait::async_trait;
use time::macros::datetime;
use time::Duration;

use super::*;
use crate::db::models::{Answer, Attempt, Question, Test};
use crate::repositories::memory::MemoryStore;
use crate::repositories::{AttemptCounts, NewQuestion, NewTest, Store, StoreResult, TestDetails};
use crate::services::events::LifecycleEvent;
use crate::test_support::{admin, engine_with_store, seed_test, student, test_engine};

const START: PrimitiveDateTime = datetime!(2025-03-01 10:00);

#[tokio::test]
async fn start_twice_returns_same_attempt() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let user = student("u-1");

    let first = start_attempt(&ctx.engine, &test.id, &user).await.unwrap();
    let second = start_attempt(&ctx.engine, &test.id, &user).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.attempt.id, second.attempt.id);
    assert_eq!(first.attempt.status, AttemptStatus::InProgress);
    assert_eq!(first.attempt.started_at, datetime!(2025-03-01 10:05));
    let open = ctx
        .engine
        .store()
        .list_attempts(&test.id, Some(AttemptStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn concurrent_starts_leave_one_in_progress_attempt() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = ctx.engine.clone();
        let test_id = test.id.clone();
        handles.push(tokio::spawn(async move {
            start_attempt(&engine, &test_id, &student("u-1")).await.map(|o| o.attempt.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(ctx.engine.store().count_attempts(&test.id).await.unwrap().in_progress, 1);
}

#[tokio::test]
async fn end_boundary_is_inclusive() {
    let ctx = test_engine(datetime!(2025-03-01 11:00));
    let (test, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;

    assert!(start_attempt(&ctx.engine, &test.id, &student("u-1")).await.is_ok());

    ctx.clock.advance(Duration::seconds(1));
    let err = start_attempt(&ctx.engine, &test.id, &student("u-2")).await.unwrap_err();
    match err {
        LifecycleError::State { message, current } => {
            assert_eq!(message, "test has ended");
            assert_eq!(current, "active");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn start_rejects_tests_that_are_not_open() {
    let ctx = test_engine(datetime!(2025-03-01 09:00));
    let (scheduled, _) = seed_test(&ctx.engine, TestStatus::Scheduled, START, 60, &[(1, 1)]).await;
    let (early, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let (done, _) = seed_test(&ctx.engine, TestStatus::Completed, START, 60, &[(1, 1)]).await;
    let user = student("u-1");

    let not_started = start_attempt(&ctx.engine, &scheduled.id, &user).await.unwrap_err();
    assert!(
        matches!(not_started, LifecycleError::State { ref message, .. } if message == "test has not started yet")
    );
    let before_window = start_attempt(&ctx.engine, &early.id, &user).await.unwrap_err();
    assert!(
        matches!(before_window, LifecycleError::State { ref message, .. } if message == "test has not started yet")
    );
    let ended = start_attempt(&ctx.engine, &done.id, &user).await.unwrap_err();
    assert!(matches!(ended, LifecycleError::State { ref message, .. } if message == "test has ended"));
    let missing = start_attempt(&ctx.engine, "missing", &user).await.unwrap_err();
    assert!(matches!(missing, LifecycleError::NotFound(_)));
}

#[tokio::test]
async fn retake_after_submit_is_a_conflict() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let user = student("u-1");

    let started = start_attempt(&ctx.engine, &test.id, &user).await.unwrap();
    submit_attempt(&ctx.engine, &started.attempt.id, &user).await.unwrap();

    let err = start_attempt(&ctx.engine, &test.id, &user).await.unwrap_err();
    match err {
        LifecycleError::Conflict(message) => assert_eq!(message, "already completed this test"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn answers_are_scored_at_write_time_and_overwritten() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) =
        seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(2, 5), (0, 3)]).await;
    let user = student("u-1");
    let attempt = start_attempt(&ctx.engine, &test.id, &user).await.unwrap().attempt;

    let wrong = record_answer(&ctx.engine, &attempt.id, &questions[0].id, &user, 1, 10).await.unwrap();
    assert!(!wrong.is_correct);
    let right = record_answer(&ctx.engine, &attempt.id, &questions[0].id, &user, 2, 15).await.unwrap();
    assert!(right.is_correct);
    assert_eq!(right.id, wrong.id);

    let answers = ctx.engine.store().list_answers(&attempt.id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].time_spent_seconds, 15);

    let submitted = submit_attempt(&ctx.engine, &attempt.id, &user).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Completed);
    assert_eq!(submitted.score, 5);
    assert_eq!(submitted.total_points, 8);
    assert_eq!(submitted.ended_at, Some(datetime!(2025-03-01 10:05)));
}

#[tokio::test]
async fn record_answer_validates_input_and_ownership() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let (other, other_questions) =
        seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let user = student("u-1");
    let attempt = start_attempt(&ctx.engine, &test.id, &user).await.unwrap().attempt;
    start_attempt(&ctx.engine, &other.id, &user).await.unwrap();
    let question_id = &questions[0].id;

    let negative = record_answer(&ctx.engine, &attempt.id, question_id, &user, -1, 0).await;
    assert!(matches!(negative, Err(LifecycleError::Validation(_))));
    let out_of_range = record_answer(&ctx.engine, &attempt.id, question_id, &user, 4, 0).await;
    assert!(matches!(out_of_range, Err(LifecycleError::Validation(_))));
    let negative_time = record_answer(&ctx.engine, &attempt.id, question_id, &user, 0, -5).await;
    assert!(matches!(negative_time, Err(LifecycleError::Validation(_))));

    let foreign_question =
        record_answer(&ctx.engine, &attempt.id, &other_questions[0].id, &user, 0, 1).await;
    assert!(matches!(foreign_question, Err(LifecycleError::NotFound(_))));

    let stranger = record_answer(&ctx.engine, &attempt.id, question_id, &student("u-2"), 0, 1).await;
    assert!(matches!(stranger, Err(LifecycleError::NotFound(_))));
}

#[tokio::test]
async fn finalized_attempts_are_read_only() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let user = student("u-1");
    let attempt = start_attempt(&ctx.engine, &test.id, &user).await.unwrap().attempt;
    submit_attempt(&ctx.engine, &attempt.id, &user).await.unwrap();

    let again = submit_attempt(&ctx.engine, &attempt.id, &user).await.unwrap_err();
    assert!(matches!(again, LifecycleError::State { ref current, .. } if current == "completed"));

    let write = record_answer(&ctx.engine, &attempt.id, &questions[0].id, &user, 1, 1).await;
    assert!(matches!(write, Err(LifecycleError::State { .. })));
}

#[tokio::test]
async fn timeout_sweep_scores_open_attempts_once() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) =
        seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 2), (0, 2)]).await;
    let (alice, bob, carol) = (student("alice"), student("bob"), student("carol"));

    let a = start_attempt(&ctx.engine, &test.id, &alice).await.unwrap().attempt;
    let b = start_attempt(&ctx.engine, &test.id, &bob).await.unwrap().attempt;
    let c = start_attempt(&ctx.engine, &test.id, &carol).await.unwrap().attempt;
    record_answer(&ctx.engine, &a.id, &questions[0].id, &alice, 1, 30).await.unwrap();
    submit_attempt(&ctx.engine, &c.id, &carol).await.unwrap();
    ctx.clock.set(datetime!(2025-03-01 11:00));

    let report = timeout_sweep(&ctx.engine, &test.id).await.unwrap();
    assert_eq!(report, SweepReport { timed_out: 2, failures: 0 });

    let a = ctx.engine.store().find_attempt(&a.id).await.unwrap().unwrap();
    assert_eq!(a.status, AttemptStatus::TimedOut);
    assert_eq!((a.score, a.total_points), (2, 4));
    assert_eq!(a.ended_at, Some(datetime!(2025-03-01 11:00)));
    let b = ctx.engine.store().find_attempt(&b.id).await.unwrap().unwrap();
    assert_eq!((b.status, b.score), (AttemptStatus::TimedOut, 0));
    let c = ctx.engine.store().find_attempt(&c.id).await.unwrap().unwrap();
    assert_eq!(c.status, AttemptStatus::Completed);

    let rerun = timeout_sweep(&ctx.engine, &test.id).await.unwrap();
    assert_eq!(rerun, SweepReport::default());
}

#[tokio::test]
async fn start_publishes_join_and_stats() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, _) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let mut events = ctx.events.subscribe();

    start_attempt(&ctx.engine, &test.id, &student("u-1")).await.unwrap();

    assert!(matches!(
        events.try_recv().unwrap(),
        LifecycleEvent::ParticipantJoined { ref user_id, .. } if user_id == "u-1"
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        LifecycleEvent::StatsChanged { in_progress: 1, participants: 1, .. }
    ));
}

#[tokio::test]
async fn attempts_are_visible_to_owner_and_admin_only() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 1)]).await;
    let user = student("u-1");
    let attempt = start_attempt(&ctx.engine, &test.id, &user).await.unwrap().attempt;
    record_answer(&ctx.engine, &attempt.id, &questions[0].id, &user, 1, 3).await.unwrap();

    let own = get_attempt(&ctx.engine, &attempt.id, &user).await.unwrap();
    assert_eq!(own.answers.len(), 1);
    assert!(get_attempt(&ctx.engine, &attempt.id, &admin("admin-1")).await.is_ok());
    assert!(matches!(
        get_attempt(&ctx.engine, &attempt.id, &student("u-2")).await,
        Err(LifecycleError::NotFound(_))
    ));

    let mine = find_for_user(&ctx.engine, &test.id, &user).await.unwrap();
    assert_eq!(mine.map(|attempt| attempt.id), Some(attempt.id));
    assert!(find_for_user(&ctx.engine, &test.id, &student("u-2")).await.unwrap().is_none());
}

#[tokio::test]
async fn answer_recorded_during_submit_is_counted_in_the_score() {
    let store =
        SlowFinalizeStore { inner: MemoryStore::new(), delay: std::time::Duration::from_millis(50) };
    let ctx = engine_with_store(Arc::new(store), datetime!(2025-03-01 10:05));
    let (test, questions) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 5)]).await;
    let user = student("u-1");
    let started = start_attempt(&ctx.engine, &test.id, &user).await.unwrap();

    let submit = {
        let engine = ctx.engine.clone();
        let user = user.clone();
        let attempt_id = started.attempt.id.clone();
        tokio::spawn(async move { submit_attempt(&engine, &attempt_id, &user).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let answered =
        record_answer(&ctx.engine, &started.attempt.id, &questions[0].id, &user, 1, 12).await;
    let submitted = submit.await.expect("submit task").unwrap();

    let stored = ctx.engine.store().list_answers(&started.attempt.id).await.unwrap();
    let stored_points: i32 = stored
        .iter()
        .filter(|answer| answer.is_correct)
        .filter_map(|answer| questions.iter().find(|question| question.id == answer.question_id))
        .map(|question| question.points)
        .sum();

    assert!(answered.is_ok(), "answer landed while the attempt was still open");
    assert_eq!(submitted.status, AttemptStatus::Completed);
    assert_eq!(submitted.score, stored_points);
    assert_eq!(submitted.score, 5);
    assert_eq!(submitted.total_points, 5);
}

#[tokio::test]
async fn answer_after_submit_is_rejected_and_score_unchanged() {
    let ctx = test_engine(datetime!(2025-03-01 10:05));
    let (test, questions) = seed_test(&ctx.engine, TestStatus::Active, START, 60, &[(1, 5)]).await;
    let user = student("u-1");
    let started = start_attempt(&ctx.engine, &test.id, &user).await.unwrap();

    let submitted = submit_attempt(&ctx.engine, &started.attempt.id, &user).await.unwrap();
    let late = record_answer(&ctx.engine, &started.attempt.id, &questions[0].id, &user, 1, 3).await;

    assert!(matches!(late, Err(LifecycleError::State { .. })));
    assert_eq!(submitted.score, 0);
    assert!(ctx.engine.store().list_answers(&started.attempt.id).await.unwrap().is_empty());
}

/// Memory store that holds every finalize back for `delay`, widening the
/// window between a submit being issued and the attempt being closed.
struct SlowFinalizeStore {
    inner: MemoryStore,
    delay: std::time::Duration,
}

#[async_trait]
impl Store for SlowFinalizeStore {
    async fn health(&self) -> StoreResult<()> {
        self.inner.health().await
    }

    async fn create_test(&self, test: NewTest, questions: Vec<NewQuestion>) -> StoreResult<Test> {
        self.inner.create_test(test, questions).await
    }

    async fn find_test(&self, id: &str) -> StoreResult<Option<Test>> {
        self.inner.find_test(id).await
    }

    async fn list_tests(
        &self,
        status: Option<TestStatus>,
        skip: i64,
        limit: i64,
    ) -> StoreResult<Vec<Test>> {
        self.inner.list_tests(status, skip, limit).await
    }

    async fn list_due_to_start(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        self.inner.list_due_to_start(now).await
    }

    async fn list_due_to_end(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        self.inner.list_due_to_end(now).await
    }

    async fn list_completed_with_open_attempts(&self) -> StoreResult<Vec<String>> {
        self.inner.list_completed_with_open_attempts().await
    }

    async fn transition_test(
        &self,
        id: &str,
        from: TestStatus,
        to: TestStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<Option<Test>> {
        self.inner.transition_test(id, from, to, at).await
    }

    async fn update_test(
        &self,
        id: &str,
        expected: TestStatus,
        details: TestDetails,
    ) -> StoreResult<Option<Test>> {
        self.inner.update_test(id, expected, details).await
    }

    async fn add_questions(
        &self,
        test_id: &str,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<bool> {
        self.inner.add_questions(test_id, questions).await
    }

    async fn list_questions(&self, test_id: &str) -> StoreResult<Vec<Question>> {
        self.inner.list_questions(test_id).await
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        self.inner.find_question(id).await
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<bool> {
        self.inner.create_attempt(attempt).await
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<Attempt>> {
        self.inner.find_attempt(id).await
    }

    async fn list_attempts_for_user(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<Attempt>> {
        self.inner.list_attempts_for_user(test_id, user_id).await
    }

    async fn list_attempts(
        &self,
        test_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>> {
        self.inner.list_attempts(test_id, status).await
    }

    async fn count_attempts(&self, test_id: &str) -> StoreResult<AttemptCounts> {
        self.inner.count_attempts(test_id).await
    }

    async fn finalize_attempt(
        &self,
        id: &str,
        finalize: FinalizeAttempt,
    ) -> StoreResult<Option<Attempt>> {
        tokio::time::sleep(self.delay).await;
        self.inner.finalize_attempt(id, finalize).await
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> StoreResult<Option<Answer>> {
        self.inner.upsert_answer(answer).await
    }

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<Answer>> {
        self.inner.list_answers(attempt_id).await
    }
}
