use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::RwLock;

use crate::db::models::{Answer, Attempt, Question, Test};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::{
    AttemptCounts, FinalizeAttempt, NewAnswer, NewAttempt, NewQuestion, NewTest, Store,
    StoreResult, TestDetails,
};
use crate::services::scoring::{self, Score};

#[derive(Default)]
struct Tables {
    tests: HashMap<String, Test>,
    questions: HashMap<String, Question>,
    attempts: HashMap<String, Attempt>,
    answers: HashMap<(String, String), Answer>,
}

/// Process-local store. All tables sit behind one lock, so every conditional
/// write is a compare-and-set under the write guard.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

fn question_row(question: NewQuestion) -> Question {
    Question {
        id: question.id,
        test_id: question.test_id,
        prompt: question.prompt,
        options: Json(question.options),
        correct_option: question.correct_option,
        points: question.points,
        order_index: question.order_index,
        created_at: question.created_at,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_test(&self, test: NewTest, questions: Vec<NewQuestion>) -> StoreResult<Test> {
        let mut tables = self.tables.write().await;
        let row = Test {
            id: test.id,
            title: test.title,
            subject: test.subject,
            duration_minutes: test.duration_minutes,
            scheduled_start: test.scheduled_start,
            scheduled_end: test.scheduled_end,
            status: test.status,
            actual_started_at: None,
            actual_ended_at: None,
            created_by: test.created_by,
            created_at: test.created_at,
            updated_at: test.created_at,
        };
        tables.tests.insert(row.id.clone(), row.clone());
        for question in questions {
            let question = question_row(question);
            tables.questions.insert(question.id.clone(), question);
        }
        Ok(row)
    }

    async fn find_test(&self, id: &str) -> StoreResult<Option<Test>> {
        let tables = self.tables.read().await;
        Ok(tables.tests.get(id).cloned())
    }

    async fn list_tests(
        &self,
        status: Option<TestStatus>,
        skip: i64,
        limit: i64,
    ) -> StoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Test> = tables
            .tests
            .values()
            .filter(|test| status.map_or(true, |status| test.status == status))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.scheduled_start.cmp(&a.scheduled_start).then(a.id.cmp(&b.id)));

        Ok(items
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.clamp(1, 1000) as usize)
            .collect())
    }

    async fn list_due_to_start(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Test> = tables
            .tests
            .values()
            .filter(|test| test.status == TestStatus::Scheduled && test.scheduled_start <= now)
            .cloned()
            .collect();
        items.sort_by_key(|test| test.scheduled_start);
        Ok(items)
    }

    async fn list_due_to_end(&self, now: PrimitiveDateTime) -> StoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Test> = tables
            .tests
            .values()
            .filter(|test| test.status == TestStatus::Active && test.scheduled_end <= now)
            .cloned()
            .collect();
        items.sort_by_key(|test| test.scheduled_end);
        Ok(items)
    }

    async fn list_completed_with_open_attempts(&self) -> StoreResult<Vec<String>> {
        let tables = self.tables.read().await;
        let mut ids: Vec<String> = tables
            .attempts
            .values()
            .filter(|attempt| attempt.status == AttemptStatus::InProgress)
            .filter(|attempt| {
                tables
                    .tests
                    .get(&attempt.test_id)
                    .is_some_and(|test| test.status == TestStatus::Completed)
            })
            .map(|attempt| attempt.test_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn transition_test(
        &self,
        id: &str,
        from: TestStatus,
        to: TestStatus,
        at: PrimitiveDateTime,
    ) -> StoreResult<Option<Test>> {
        let mut tables = self.tables.write().await;
        let Some(test) = tables.tests.get_mut(id) else {
            return Ok(None);
        };
        if test.status != from {
            return Ok(None);
        }

        test.status = to;
        test.updated_at = at;
        match to {
            TestStatus::Active => test.actual_started_at = Some(at),
            TestStatus::Completed => test.actual_ended_at = Some(at),
            TestStatus::Draft | TestStatus::Scheduled => {}
        }
        Ok(Some(test.clone()))
    }

    async fn update_test(
        &self,
        id: &str,
        expected: TestStatus,
        details: TestDetails,
    ) -> StoreResult<Option<Test>> {
        let mut tables = self.tables.write().await;
        let Some(test) = tables.tests.get_mut(id) else {
            return Ok(None);
        };
        if test.status != expected {
            return Ok(None);
        }

        test.title = details.title;
        test.subject = details.subject;
        test.duration_minutes = details.duration_minutes;
        test.scheduled_start = details.scheduled_start;
        test.scheduled_end = details.scheduled_end;
        test.updated_at = details.updated_at;
        Ok(Some(test.clone()))
    }

    async fn add_questions(
        &self,
        test_id: &str,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let is_draft =
            tables.tests.get(test_id).is_some_and(|test| test.status == TestStatus::Draft);
        if !is_draft {
            return Ok(false);
        }
        for question in questions {
            let question = question_row(question);
            tables.questions.insert(question.id.clone(), question);
        }
        Ok(true)
    }

    async fn list_questions(&self, test_id: &str) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Question> = tables
            .questions
            .values()
            .filter(|question| question.test_id == test_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<Question>> {
        let tables = self.tables.read().await;
        Ok(tables.questions.get(id).cloned())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let has_open = tables.attempts.values().any(|existing| {
            existing.test_id == attempt.test_id
                && existing.user_id == attempt.user_id
                && existing.status == AttemptStatus::InProgress
        });
        if has_open {
            return Ok(false);
        }

        let row = Attempt {
            id: attempt.id,
            test_id: attempt.test_id,
            user_id: attempt.user_id,
            status: AttemptStatus::InProgress,
            started_at: attempt.started_at,
            ended_at: None,
            score: 0,
            total_points: 0,
            updated_at: attempt.started_at,
        };
        tables.attempts.insert(row.id.clone(), row);
        Ok(true)
    }

    async fn find_attempt(&self, id: &str) -> StoreResult<Option<Attempt>> {
        let tables = self.tables.read().await;
        Ok(tables.attempts.get(id).cloned())
    }

    async fn list_attempts_for_user(
        &self,
        test_id: &str,
        user_id: &str,
    ) -> StoreResult<Vec<Attempt>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|attempt| attempt.test_id == test_id && attempt.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(items)
    }

    async fn list_attempts(
        &self,
        test_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Attempt> = tables
            .attempts
            .values()
            .filter(|attempt| attempt.test_id == test_id)
            .filter(|attempt| status.map_or(true, |status| attempt.status == status))
            .cloned()
            .collect();
        items.sort_by_key(|attempt| attempt.started_at);
        Ok(items)
    }

    async fn count_attempts(&self, test_id: &str) -> StoreResult<AttemptCounts> {
        let tables = self.tables.read().await;
        let mut counts = AttemptCounts::default();
        for attempt in tables.attempts.values().filter(|attempt| attempt.test_id == test_id) {
            counts.add(attempt.status, 1);
        }
        Ok(counts)
    }

    async fn finalize_attempt(
        &self,
        id: &str,
        finalize: FinalizeAttempt,
    ) -> StoreResult<Option<Attempt>> {
        let mut tables = self.tables.write().await;
        let test_id = match tables.attempts.get(id) {
            Some(attempt) if attempt.status == AttemptStatus::InProgress => attempt.test_id.clone(),
            _ => return Ok(None),
        };

        let questions: Vec<Question> = tables
            .questions
            .values()
            .filter(|question| question.test_id == test_id)
            .cloned()
            .collect();
        let answers: Vec<Answer> = tables
            .answers
            .values()
            .filter(|answer| answer.attempt_id == id)
            .cloned()
            .collect();
        let Score { score, total_points } = scoring::score(&questions, &answers);

        let Some(attempt) = tables.attempts.get_mut(id) else {
            return Ok(None);
        };
        attempt.status = finalize.status;
        attempt.score = score;
        attempt.total_points = total_points;
        attempt.ended_at = Some(finalize.ended_at);
        attempt.updated_at = finalize.ended_at;
        Ok(Some(attempt.clone()))
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> StoreResult<Option<Answer>> {
        let mut tables = self.tables.write().await;
        let open = tables
            .attempts
            .get(&answer.attempt_id)
            .is_some_and(|attempt| attempt.status == AttemptStatus::InProgress);
        if !open {
            return Ok(None);
        }

        let key = (answer.attempt_id.clone(), answer.question_id.clone());
        let row = match tables.answers.get_mut(&key) {
            Some(existing) => {
                existing.selected_option = answer.selected_option;
                existing.is_correct = answer.is_correct;
                existing.time_spent_seconds = answer.time_spent_seconds;
                existing.answered_at = answer.answered_at;
                existing.clone()
            }
            None => {
                let row = Answer {
                    id: answer.id,
                    attempt_id: answer.attempt_id,
                    question_id: answer.question_id,
                    selected_option: answer.selected_option,
                    is_correct: answer.is_correct,
                    time_spent_seconds: answer.time_spent_seconds,
                    answered_at: answer.answered_at,
                };
                tables.answers.insert(key, row.clone());
                row
            }
        };
        Ok(Some(row))
    }

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<Answer>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Answer> = tables
            .answers
            .values()
            .filter(|answer| answer.attempt_id == attempt_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.answered_at.cmp(&b.answered_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn new_test(id: &str, status: TestStatus) -> NewTest {
        NewTest {
            id: id.to_string(),
            title: "Algebra".to_string(),
            subject: "math".to_string(),
            duration_minutes: 60,
            scheduled_start: datetime!(2025-03-01 10:00),
            scheduled_end: datetime!(2025-03-01 11:00),
            status,
            created_by: "admin-1".to_string(),
            created_at: datetime!(2025-02-01 09:00),
        }
    }

    fn new_attempt(id: &str, test_id: &str, user_id: &str) -> NewAttempt {
        NewAttempt {
            id: id.to_string(),
            test_id: test_id.to_string(),
            user_id: user_id.to_string(),
            started_at: datetime!(2025-03-01 10:05),
        }
    }

    fn new_answer(attempt_id: &str, selected_option: i32) -> NewAnswer {
        NewAnswer {
            id: format!("answer-{selected_option}"),
            attempt_id: attempt_id.to_string(),
            question_id: "q-1".to_string(),
            selected_option,
            is_correct: selected_option == 1,
            time_spent_seconds: 10,
            answered_at: datetime!(2025-03-01 10:06),
        }
    }

    #[tokio::test]
    async fn transition_only_applies_from_expected_status() {
        let store = MemoryStore::new();
        store.create_test(new_test("t-1", TestStatus::Scheduled), Vec::new()).await.unwrap();
        let at = datetime!(2025-03-01 10:00);

        let first = store
            .transition_test("t-1", TestStatus::Scheduled, TestStatus::Active, at)
            .await
            .unwrap()
            .expect("first transition wins");
        let second = store
            .transition_test("t-1", TestStatus::Scheduled, TestStatus::Active, at)
            .await
            .unwrap();

        assert_eq!(first.status, TestStatus::Active);
        assert_eq!(first.actual_started_at, Some(at));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn only_one_in_progress_attempt_per_user() {
        let store = MemoryStore::new();

        assert!(store.create_attempt(new_attempt("a-1", "t-1", "u-1")).await.unwrap());
        assert!(!store.create_attempt(new_attempt("a-2", "t-1", "u-1")).await.unwrap());
        assert!(store.create_attempt(new_attempt("a-3", "t-1", "u-2")).await.unwrap());

        let counts = store.count_attempts("t-1").await.unwrap();
        assert_eq!(counts.in_progress, 2);
    }

    #[tokio::test]
    async fn answer_upsert_overwrites_and_stops_after_finalize() {
        let store = MemoryStore::new();
        store.create_attempt(new_attempt("a-1", "t-1", "u-1")).await.unwrap();

        store.upsert_answer(new_answer("a-1", 0)).await.unwrap().expect("insert");
        let updated = store.upsert_answer(new_answer("a-1", 1)).await.unwrap().expect("update");
        assert_eq!(updated.id, "answer-0");
        assert_eq!(updated.selected_option, 1);
        assert_eq!(store.list_answers("a-1").await.unwrap().len(), 1);

        let finalize =
            FinalizeAttempt { status: AttemptStatus::Completed, ended_at: datetime!(2025-03-01 10:30) };
        assert!(store.finalize_attempt("a-1", finalize.clone()).await.unwrap().is_some());
        assert!(store.finalize_attempt("a-1", finalize).await.unwrap().is_none());
        assert!(store.upsert_answer(new_answer("a-1", 2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finalize_scores_answers_held_at_write_time() {
        let store = MemoryStore::new();
        let question = NewQuestion {
            id: "q-1".to_string(),
            test_id: "t-1".to_string(),
            prompt: "2 + 2?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            correct_option: 1,
            points: 3,
            order_index: 0,
            created_at: datetime!(2025-02-01 09:00),
        };
        store.create_test(new_test("t-1", TestStatus::Active), vec![question]).await.unwrap();
        store.create_attempt(new_attempt("a-1", "t-1", "u-1")).await.unwrap();
        store.upsert_answer(new_answer("a-1", 1)).await.unwrap().expect("answer");

        let finished = store
            .finalize_attempt(
                "a-1",
                FinalizeAttempt { status: AttemptStatus::TimedOut, ended_at: datetime!(2025-03-01 11:00) },
            )
            .await
            .unwrap()
            .expect("finalized");

        assert_eq!(finished.status, AttemptStatus::TimedOut);
        assert_eq!(finished.score, 3);
        assert_eq!(finished.total_points, 3);
        assert_eq!(finished.ended_at, Some(datetime!(2025-03-01 11:00)));
    }

    #[tokio::test]
    async fn questions_are_only_added_to_drafts() {
        let store = MemoryStore::new();
        store.create_test(new_test("draft", TestStatus::Draft), Vec::new()).await.unwrap();
        store.create_test(new_test("live", TestStatus::Scheduled), Vec::new()).await.unwrap();
        let question = NewQuestion {
            id: "q-1".to_string(),
            test_id: "draft".to_string(),
            prompt: "2 + 2?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            correct_option: 1,
            points: 1,
            order_index: 0,
            created_at: datetime!(2025-02-01 09:00),
        };

        assert!(store.add_questions("draft", vec![question.clone()]).await.unwrap());
        assert!(!store.add_questions("live", vec![question]).await.unwrap());
        assert_eq!(store.list_questions("draft").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn completed_tests_with_open_attempts_are_reported_once() {
        let store = MemoryStore::new();
        store.create_test(new_test("t-1", TestStatus::Completed), Vec::new()).await.unwrap();
        store.create_attempt(new_attempt("a-1", "t-1", "u-1")).await.unwrap();
        store.create_attempt(new_attempt("a-2", "t-1", "u-2")).await.unwrap();

        let ids = store.list_completed_with_open_attempts().await.unwrap();
        assert_eq!(ids, vec!["t-1".to_string()]);
    }
}
