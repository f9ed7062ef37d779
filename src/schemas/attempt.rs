use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{Answer, Attempt};
use crate::db::types::AttemptStatus;
use crate::schemas::test::QuestionPublic;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerSubmit {
    #[serde(alias = "selectedOption")]
    #[validate(range(min = 0, message = "selected_option must be non-negative"))]
    pub(crate) selected_option: i32,
    #[serde(default, alias = "timeSpentSeconds")]
    #[validate(range(min = 0, message = "time_spent_seconds must be non-negative"))]
    pub(crate) time_spent_seconds: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) ended_at: Option<String>,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) selected_option: i32,
    pub(crate) time_spent_seconds: i32,
    pub(crate) answered_at: String,
    /// Only revealed once the attempt is finalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSession {
    pub(crate) attempt: AttemptResponse,
    pub(crate) questions: Vec<QuestionPublic>,
    pub(crate) answers: Vec<AnswerResponse>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            test_id: attempt.test_id,
            user_id: attempt.user_id,
            status: attempt.status,
            started_at: format_primitive(attempt.started_at),
            ended_at: format_optional(attempt.ended_at),
            score: attempt.score,
            total_points: attempt.total_points,
        }
    }
}

impl AnswerResponse {
    pub(crate) fn from_answer(answer: Answer, reveal: bool) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            selected_option: answer.selected_option,
            time_spent_seconds: answer.time_spent_seconds,
            answered_at: format_primitive(answer.answered_at),
            is_correct: reveal.then_some(answer.is_correct),
        }
    }
}
