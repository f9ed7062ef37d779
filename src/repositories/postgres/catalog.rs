use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Question, Test};
use crate::db::types::{AttemptStatus, TestStatus};
use crate::repositories::{NewQuestion, NewTest, TestDetails};

pub(crate) const COLUMNS: &str = "\
    id, title, subject, duration_minutes, scheduled_start, scheduled_end, status, \
    actual_started_at, actual_ended_at, created_by, created_at, updated_at";

pub(crate) const QUESTION_COLUMNS: &str =
    "id, test_id, prompt, options, correct_option, points, order_index, created_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    test: &NewTest,
) -> Result<Test, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "INSERT INTO tests (
            id, title, subject, duration_minutes, scheduled_start, scheduled_end,
            status, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
        RETURNING {COLUMNS}"
    ))
    .bind(&test.id)
    .bind(&test.title)
    .bind(&test.subject)
    .bind(test.duration_minutes)
    .bind(test.scheduled_start)
    .bind(test.scheduled_end)
    .bind(test.status)
    .bind(&test.created_by)
    .bind(test.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn insert_question(
    executor: impl sqlx::PgExecutor<'_>,
    question: &NewQuestion,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO questions (
            id, test_id, prompt, options, correct_option, points, order_index, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(&question.id)
    .bind(&question.test_id)
    .bind(&question.prompt)
    .bind(Json(question.options.clone()))
    .bind(question.correct_option)
    .bind(question.points)
    .bind(question.order_index)
    .bind(question.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn lock_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<TestStatus>, sqlx::Error> {
    sqlx::query_scalar("SELECT status FROM tests WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn list(
    pool: &PgPool,
    status: Option<TestStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Test>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM tests"));

    if let Some(status) = status {
        builder.push(" WHERE status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY scheduled_start DESC, id OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Test>().fetch_all(pool).await
}

pub(crate) async fn list_due_to_start(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "SELECT {COLUMNS} FROM tests \
         WHERE status = $1 AND scheduled_start <= $2 \
         ORDER BY scheduled_start"
    ))
    .bind(TestStatus::Scheduled)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_due_to_end(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "SELECT {COLUMNS} FROM tests \
         WHERE status = $1 AND scheduled_end <= $2 \
         ORDER BY scheduled_end"
    ))
    .bind(TestStatus::Active)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_completed_with_open_attempts(
    pool: &PgPool,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT DISTINCT t.id FROM tests t \
         JOIN attempts a ON a.test_id = t.id \
         WHERE t.status = $1 AND a.status = $2",
    )
    .bind(TestStatus::Completed)
    .bind(AttemptStatus::InProgress)
    .fetch_all(pool)
    .await
}

pub(crate) async fn transition(
    pool: &PgPool,
    id: &str,
    from: TestStatus,
    to: TestStatus,
    at: PrimitiveDateTime,
) -> Result<Option<Test>, sqlx::Error> {
    let stamp = match to {
        TestStatus::Active => ", actual_started_at = $2",
        TestStatus::Completed => ", actual_ended_at = $2",
        TestStatus::Draft | TestStatus::Scheduled => "",
    };

    sqlx::query_as::<_, Test>(&format!(
        "UPDATE tests SET status = $1, updated_at = $2{stamp} \
         WHERE id = $3 AND status = $4 \
         RETURNING {COLUMNS}"
    ))
    .bind(to)
    .bind(at)
    .bind(id)
    .bind(from)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn update_details(
    pool: &PgPool,
    id: &str,
    expected: TestStatus,
    details: &TestDetails,
) -> Result<Option<Test>, sqlx::Error> {
    sqlx::query_as::<_, Test>(&format!(
        "UPDATE tests SET
            title = $1,
            subject = $2,
            duration_minutes = $3,
            scheduled_start = $4,
            scheduled_end = $5,
            updated_at = $6
         WHERE id = $7 AND status = $8
         RETURNING {COLUMNS}"
    ))
    .bind(&details.title)
    .bind(&details.subject)
    .bind(details.duration_minutes)
    .bind(details.scheduled_start)
    .bind(details.scheduled_end)
    .bind(details.updated_at)
    .bind(id)
    .bind(expected)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE test_id = $1 ORDER BY order_index, id"
    ))
    .bind(test_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_question(
    pool: &PgPool,
    id: &str,
) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}
