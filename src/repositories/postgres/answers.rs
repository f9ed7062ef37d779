use sqlx::PgPool;

use crate::db::models::Answer;
use crate::db::types::AttemptStatus;
use crate::repositories::NewAnswer;

pub(crate) const COLUMNS: &str =
    "id, attempt_id, question_id, selected_option, is_correct, time_spent_seconds, answered_at";

/// Insert-or-overwrite on `(attempt_id, question_id)`. The share lock on the
/// attempt row keeps a concurrent finalize from slipping between the status
/// check and the write.
pub(crate) async fn upsert(pool: &PgPool, answer: &NewAnswer) -> Result<Option<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (
            id, attempt_id, question_id, selected_option, is_correct, time_spent_seconds, answered_at
        )
        SELECT $1,$2,$3,$4,$5,$6,$7
        WHERE EXISTS (
            SELECT 1 FROM attempts WHERE id = $2 AND status = $8 FOR SHARE
        )
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            selected_option = EXCLUDED.selected_option,
            is_correct = EXCLUDED.is_correct,
            time_spent_seconds = EXCLUDED.time_spent_seconds,
            answered_at = EXCLUDED.answered_at
        RETURNING {COLUMNS}"
    ))
    .bind(&answer.id)
    .bind(&answer.attempt_id)
    .bind(&answer.question_id)
    .bind(answer.selected_option)
    .bind(answer.is_correct)
    .bind(answer.time_spent_seconds)
    .bind(answer.answered_at)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY answered_at, id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}
