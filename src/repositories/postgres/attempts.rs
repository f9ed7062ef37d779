use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::repositories::{FinalizeAttempt, NewAttempt};

pub(crate) const COLUMNS: &str =
    "id, test_id, user_id, status, started_at, ended_at, score, total_points, updated_at";

/// Relies on `ux_attempts_in_progress`: a concurrent start for the same
/// `(test, user)` loses the insert instead of creating a second live attempt.
pub(crate) async fn create(pool: &PgPool, attempt: &NewAttempt) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (id, test_id, user_id, status, started_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$5)
         ON CONFLICT DO NOTHING",
    )
    .bind(&attempt.id)
    .bind(&attempt.test_id)
    .bind(&attempt.user_id)
    .bind(AttemptStatus::InProgress)
    .bind(attempt.started_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_for_user(
    pool: &PgPool,
    test_id: &str,
    user_id: &str,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE test_id = $1 AND user_id = $2 \
         ORDER BY started_at DESC"
    ))
    .bind(test_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_test(
    pool: &PgPool,
    test_id: &str,
    status: Option<AttemptStatus>,
) -> Result<Vec<Attempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {COLUMNS} FROM attempts WHERE test_id = "
    ));
    builder.push_bind(test_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY started_at");

    builder.build_query_as::<Attempt>().fetch_all(pool).await
}

pub(crate) async fn count_by_status(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<(AttemptStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (AttemptStatus, i64)>(
        "SELECT status, COUNT(*) FROM attempts WHERE test_id = $1 GROUP BY status",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}

/// Locks the attempt row, then scores and closes it inside the same
/// transaction. `answers::upsert` holds `FOR SHARE` on the same row, so an
/// answer either commits before the lock is granted and is counted, or sees
/// the terminal status afterwards and is rejected.
pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    finalize: &FinalizeAttempt,
) -> Result<Option<Attempt>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let locked: Option<String> = sqlx::query_scalar(
        "SELECT id FROM attempts WHERE id = $1 AND status = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(&mut *tx)
    .await?;

    if locked.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE attempts
         SET status = $1,
             score = (
                 SELECT COALESCE(SUM(q.points), 0)::INTEGER
                 FROM answers a
                 JOIN questions q ON q.id = a.question_id
                 WHERE a.attempt_id = attempts.id AND a.is_correct
             ),
             total_points = (
                 SELECT COALESCE(SUM(q.points), 0)::INTEGER
                 FROM questions q
                 WHERE q.test_id = attempts.test_id
             ),
             ended_at = $2,
             updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(finalize.status)
    .bind(finalize.ended_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(attempt)
}
