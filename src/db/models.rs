use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, TestStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_start: PrimitiveDateTime,
    pub(crate) scheduled_end: PrimitiveDateTime,
    pub(crate) status: TestStatus,
    pub(crate) actual_started_at: Option<PrimitiveDateTime>,
    pub(crate) actual_ended_at: Option<PrimitiveDateTime>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) prompt: String,
    pub(crate) options: Json<Vec<String>>,
    pub(crate) correct_option: i32,
    pub(crate) points: i32,
    pub(crate) order_index: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

impl Question {
    pub(crate) fn option_count(&self) -> usize {
        self.options.0.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) ended_at: Option<PrimitiveDateTime>,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) selected_option: i32,
    pub(crate) is_correct: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: PrimitiveDateTime,
}
