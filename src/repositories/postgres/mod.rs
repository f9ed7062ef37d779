mod answers;
mod attempts;
mod catalog;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{Answer, Attempt, Question, Test};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::{
    AttemptCounts, FinalizeAttempt, NewAnswer, NewAttempt, NewQuestion, NewTest, Store,
    StoreResult, TestDetails,
};

#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_test(&self, test: NewTest, questions: Vec<NewQuestion>) -> StoreResult<Test> {
        let mut tx = self.pool.begin().await?;
        let created = catalog::insert(&mut *tx, &test).await?;
        for question in &questions {
            catalog::insert_question(&mut *tx, question).await?;
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find_test(&self, id: &str) -> StoreResult<Option<Test>> {
        Ok(catalog::find_by_id(&self.pool, id).await?)
    }

    async fn list_tests(
        &self,
        status: Option<TestStatus>,
        skip: i64,
        limit: i64,
    ) -> StoreResult<Vec<Test>> {
        Ok(catalog::list(&self.pool, status, skip, limit).await?)
    }

    async fn list_due_to_start(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        Ok(catalog::list_due_to_start(&self.pool, now).await?)
    }

    async fn list_due_to_end(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        Ok(catalog::list_due_to_end(&self.pool, now).await?)
    }

    async fn list_completed_with_open_attempts(&self) -> StoreResult<Vec<String>> {
        Ok(catalog::list_completed_with_open_attempts(&self.pool).await?)
    }

    async fn transition_test(
        &self,
        id: &str,
        from: TestStatus,
        to: TestStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<Option<Test>> {
        Ok(catalog::transition(&self.pool, id, from, to, at).await?)
    }

    async fn update_test(
        &self,
        id: &str,
        expected: TestStatus,
        details: TestDetails,
    ) -> StoreResult<Option<Test>> {
        Ok(catalog::update_details(&self.pool, id, expected, &details).await?)
    }

    async fn add_questions(
        &self,
        test_id: &str,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let status = catalog::lock_status(&mut *tx, test_id).await?;
        if status != Some(TestStatus::Draft) {
            tx.rollback().await?;
            return Ok(false);
        }
        for question in &questions {
            catalog::insert_question(&mut *tx, question).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn list_questions(&self, test_id: &str) -> StoreResult<Vec<Question>> {
        Ok(catalog::list_questions(&self.pool, test_id).await?)
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        Ok(catalog::find_question(&self.pool, id).await?)
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<bool> {
        Ok(attempts::create(&self.pool, &attempt).await?)
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<Attempt>> {
        Ok(attempts::find_by_id(&self.pool, id).await?)
    }

    async fn list_attempts_for_user(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<Attempt>> {
        Ok(attempts::list_for_user(&self.pool, test_id, user_id).await?)
    }

    async fn list_attempts(
        &self,
        test_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>> {
        Ok(attempts::list_by_test(&self.pool, test_id, status).await?)
    }

    async fn count_attempts(&self, test_id: &str) -> StoreResult<AttemptCounts> {
        let rows = attempts::count_by_status(&self.pool, test_id).await?;
        let mut counts = AttemptCounts::default();
        for (status, count) in rows {
            counts.add(status, count);
        }
        Ok(counts)
    }

    async fn finalize_attempt(
        &self,
        id: &str,
        finalize: FinalizeAttempt,
    ) -> StoreResult<Option<Attempt>> {
        Ok(attempts::finalize(&self.pool, id, &finalize).await?)
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> StoreResult<Option<Answer>> {
        Ok(answers::upsert(&self.pool, &answer).await?)
    }

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<Answer>> {
        Ok(answers::list_by_attempt(&self.pool, attempt_id).await?)
    }
}
