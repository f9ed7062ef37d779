use std::collections::HashMap;

use crate::db::models::{Answer, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Score {
    pub(crate) score: i32,
    pub(crate) total_points: i32,
}

/// Points of correctly answered questions over the points of every question
/// in the test. Unanswered questions count in the denominator.
pub(crate) fn score(questions: &[Question], answers: &[Answer]) -> Score {
    let points: HashMap<&str, i32> =
        questions.iter().map(|question| (question.id.as_str(), question.points)).collect();

    let total_points = points.values().sum();
    let score = answers
        .iter()
        .filter(|answer| answer.is_correct)
        .filter_map(|answer| points.get(answer.question_id.as_str()))
        .sum();

    Score { score, total_points }
}

#[cfg(test)]
mod tests {
    use sqlx::types::Json;
    use time::macros::datetime;

    use super::*;

    fn question(id: &str, points: i32) -> Question {
        Question {
            id: id.to_string(),
            test_id: "t-1".to_string(),
            prompt: format!("prompt {id}"),
            options: Json(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
            correct_option: 2,
            points,
            order_index: 0,
            created_at: datetime!(2025-02-01 09:00),
        }
    }

    fn answer(question_id: &str, is_correct: bool) -> Answer {
        Answer {
            id: format!("ans-{question_id}"),
            attempt_id: "a-1".to_string(),
            question_id: question_id.to_string(),
            selected_option: if is_correct { 2 } else { 0 },
            is_correct,
            time_spent_seconds: 5,
            answered_at: datetime!(2025-03-01 10:10),
        }
    }

    #[test]
    fn unanswered_questions_still_count_towards_total() {
        let questions = vec![question("q1", 3), question("q2", 2), question("q3", 5)];
        let answers = vec![answer("q1", true), answer("q2", false)];

        assert_eq!(score(&questions, &answers), Score { score: 3, total_points: 10 });
    }

    #[test]
    fn no_answers_scores_zero() {
        let questions = vec![question("q1", 4)];
        assert_eq!(score(&questions, &[]), Score { score: 0, total_points: 4 });
    }
}
