//! Persistence seam for the lifecycle engine.
//!
//! Every state-changing method is a conditional write: it names the status the
//! row must currently hold and reports whether it won. Callers never perform an
//! unconditional status overwrite, so a clock tick racing a manual override (or
//! a submit racing a timeout sweep) resolves inside the store.

pub(crate) mod memory;
pub(crate) mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Attempt, Question, Test};
use crate::db::types::{AttemptStatus, TestStatus};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub(crate) struct NewTest {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_start: PrimitiveDateTime,
    pub(crate) scheduled_end: PrimitiveDateTime,
    pub(crate) status: TestStatus,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Full replacement of the editable test fields, applied only while the row
/// still holds the expected status.
#[derive(Debug, Clone)]
pub(crate) struct TestDetails {
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_start: PrimitiveDateTime,
    pub(crate) scheduled_end: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewQuestion {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_option: i32,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) started_at: PrimitiveDateTime,
}

/// Terminal transition for an attempt. The score is computed by the store in
/// the same atomic write, from the answers stored at that moment.
#[derive(Debug, Clone)]
pub(crate) struct FinalizeAttempt {
    pub(crate) status: AttemptStatus,
    pub(crate) ended_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct NewAnswer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_option: i32,
    pub(crate) is_correct: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AttemptCounts {
    pub(crate) in_progress: i64,
    pub(crate) completed: i64,
    pub(crate) timed_out: i64,
}

impl AttemptCounts {
    pub(crate) fn add(&mut self, status: AttemptStatus, count: i64) {
        match status {
            AttemptStatus::InProgress => self.in_progress += count,
            AttemptStatus::Completed => self.completed += count,
            AttemptStatus::TimedOut => self.timed_out += count,
        }
    }

    pub(crate) fn participants(&self) -> i64 {
        self.in_progress + self.completed + self.timed_out
    }
}

#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn health(&self) -> StoreResult<()>;

    async fn create_test(&self, test: NewTest, questions: Vec<NewQuestion>) -> StoreResult<Test>;
    async fn find_test(&self, id: &str) -> StoreResult<Option<Test>>;
    async fn list_tests(
        &self,
        status: Option<TestStatus>,
        skip: i64,
        limit: i64,
    ) -> StoreResult<Vec<Test>>;
    /// Scheduled tests whose start is at or before `now`, with no look-back bound.
    async fn list_due_to_start(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>>;
    /// Active tests whose end is at or before `now`, with no look-back bound.
    async fn list_due_to_end(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>>;
    /// Ids of completed tests that still own in-progress attempts.
    async fn list_completed_with_open_attempts(&self) -> StoreResult<Vec<String>>;
    /// `from -> to`; stamps `actual_started_at` entering active and
    /// `actual_ended_at` entering completed. `None` when the row is not in `from`.
    async fn transition_test(
        &self,
        id: &str,
        from: TestStatus,
        to: TestStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<Option<Test>>;
    async fn update_test(
        &self,
        id: &str,
        expected: TestStatus,
        details: TestDetails,
    ) -> StoreResult<Option<Test>>;

    /// Appends questions while the test is still a draft; `false` otherwise.
    async fn add_questions(&self, test_id: &str, questions: Vec<NewQuestion>)
        -> StoreResult<bool>;
    async fn list_questions(&self, test_id: &str) -> StoreResult<Vec<Question>>;
    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>>;

    /// `false` when the user already holds an in-progress attempt for the test.
    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<bool>;
    async fn find_attempt(&self, id: &str) -> StoreResult<Option<Attempt>>;
    async fn list_attempts_for_user(&self, test_id: &str, user_id: &str)
        -> StoreResult<Vec<Attempt>>;
    async fn list_attempts(
        &self,
        test_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>>;
    async fn count_attempts(&self, test_id: &str) -> StoreResult<AttemptCounts>;
    /// Scores and moves an in-progress attempt to a terminal status in one
    /// atomic step; `None` if it already left. No answer can be accepted for
    /// the attempt once this returns.
    async fn finalize_attempt(
        &self,
        id: &str,
        finalize: FinalizeAttempt,
    ) -> StoreResult<Option<Attempt>>;

    /// Inserts or overwrites the answer for `(attempt, question)`, only while the
    /// attempt is in progress; `None` otherwise.
    async fn upsert_answer(&self, answer: NewAnswer) -> StoreResult<Option<Answer>>;
    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<Answer>>;
}
