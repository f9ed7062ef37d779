//! Test administration: authoring, editing and publishing tests before they
//! enter the clock-driven part of the lifecycle.

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::format_primitive;
use crate::db::models::{Question, Test};
use crate::db::types::TestStatus;
use crate::repositories::{NewQuestion, NewTest, TestDetails};
use crate::services::errors::{LifecycleError, LifecycleResult};
use crate::services::events::{emit, LifecycleEvent, TransitionTrigger};
use crate::services::lifecycle::load_test;
use crate::services::timing::{compute_scheduled_end, validate_duration};
use crate::services::{Actor, Engine};

pub(crate) const MIN_OPTIONS: usize = 2;
pub(crate) const MAX_OPTIONS: usize = 10;

#[derive(Debug, Clone)]
pub(crate) struct QuestionInput {
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    pub(crate) correct_option: i32,
    pub(crate) points: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct CreateTestInput {
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) duration_minutes: i32,
    pub(crate) scheduled_start: PrimitiveDateTime,
    pub(crate) questions: Vec<QuestionInput>,
    pub(crate) publish: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateTestInput {
    pub(crate) title: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) scheduled_start: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone)]
pub(crate) struct TestWithQuestions {
    pub(crate) test: Test,
    pub(crate) questions: Vec<Question>,
}

pub(crate) async fn create_test(
    engine: &Engine,
    actor: &Actor,
    input: CreateTestInput,
) -> LifecycleResult<TestWithQuestions> {
    let title = required_text("title", &input.title)?;
    validate_duration(input.duration_minutes)?;
    if input.publish && input.questions.is_empty() {
        return Err(LifecycleError::validation("a published test needs at least one question"));
    }
    for question in &input.questions {
        validate_question(question)?;
    }

    let now = engine.now();
    let test_id = Uuid::new_v4().to_string();
    let status = if input.publish { TestStatus::Scheduled } else { TestStatus::Draft };
    let questions = question_rows(&test_id, 0, input.questions, now);

    let test = engine
        .store()
        .create_test(
            NewTest {
                id: test_id.clone(),
                title,
                subject: input.subject.trim().to_string(),
                duration_minutes: input.duration_minutes,
                scheduled_start: input.scheduled_start,
                scheduled_end: compute_scheduled_end(input.scheduled_start, input.duration_minutes),
                status,
                created_by: actor.user_id.clone(),
                created_at: now,
            },
            questions,
        )
        .await?;

    tracing::info!(
        test_id = %test.id,
        status = %test.status,
        created_by = %actor.user_id,
        scheduled_start = %format_primitive(test.scheduled_start),
        "Test created"
    );

    let questions = engine.store().list_questions(&test.id).await?;
    Ok(TestWithQuestions { test, questions })
}

/// Partial edit while the test is draft or scheduled. The end is always
/// recomputed from the resulting start and duration.
pub(crate) async fn update_test(
    engine: &Engine,
    test_id: &str,
    input: UpdateTestInput,
) -> LifecycleResult<Test> {
    let test = load_test(engine, test_id).await?;
    if !test.status.timing_editable() {
        return Err(LifecycleError::state(
            "only draft or scheduled tests can be edited",
            test.status,
        ));
    }

    let title = match input.title {
        Some(title) => required_text("title", &title)?,
        None => test.title.clone(),
    };
    let duration_minutes = input.duration_minutes.unwrap_or(test.duration_minutes);
    validate_duration(duration_minutes)?;
    let scheduled_start = input.scheduled_start.unwrap_or(test.scheduled_start);

    let details = TestDetails {
        title,
        subject: input.subject.map(|value| value.trim().to_string()).unwrap_or(test.subject),
        duration_minutes,
        scheduled_start,
        scheduled_end: compute_scheduled_end(scheduled_start, duration_minutes),
        updated_at: engine.now(),
    };

    match engine.store().update_test(test_id, test.status, details).await? {
        Some(updated) => Ok(updated),
        None => {
            let current = load_test(engine, test_id).await?;
            Err(LifecycleError::state("test changed state during the update", current.status))
        }
    }
}

pub(crate) async fn publish_test(engine: &Engine, test_id: &str) -> LifecycleResult<Test> {
    let test = load_test(engine, test_id).await?;
    if test.status != TestStatus::Draft {
        return Err(LifecycleError::state("only draft tests can be published", test.status));
    }
    if engine.store().list_questions(test_id).await?.is_empty() {
        return Err(LifecycleError::validation("a published test needs at least one question"));
    }

    let Some(published) = engine
        .store()
        .transition_test(test_id, TestStatus::Draft, TestStatus::Scheduled, engine.now())
        .await?
    else {
        let current = load_test(engine, test_id).await?;
        return Err(LifecycleError::state("only draft tests can be published", current.status));
    };

    tracing::info!(test_id, "Test published");
    emit(
        engine,
        LifecycleEvent::TestTransitioned {
            test_id: published.id.clone(),
            from: TestStatus::Draft,
            to: TestStatus::Scheduled,
            at: format_primitive(published.updated_at),
            trigger: TransitionTrigger::Manual,
        },
    )
    .await;

    Ok(published)
}

pub(crate) async fn add_questions(
    engine: &Engine,
    test_id: &str,
    questions: Vec<QuestionInput>,
) -> LifecycleResult<Vec<Question>> {
    if questions.is_empty() {
        return Err(LifecycleError::validation("at least one question is required"));
    }
    for question in &questions {
        validate_question(question)?;
    }

    let test = load_test(engine, test_id).await?;
    if test.status != TestStatus::Draft {
        return Err(LifecycleError::state("questions can only be added to drafts", test.status));
    }

    let existing = engine.store().list_questions(test_id).await?;
    let next_index = existing.iter().map(|question| question.order_index + 1).max().unwrap_or(0);
    let rows = question_rows(test_id, next_index, questions, engine.now());

    if !engine.store().add_questions(test_id, rows).await? {
        let current = load_test(engine, test_id).await?;
        return Err(LifecycleError::state("questions can only be added to drafts", current.status));
    }

    Ok(engine.store().list_questions(test_id).await?)
}

pub(crate) async fn get_test(engine: &Engine, test_id: &str) -> LifecycleResult<TestWithQuestions> {
    let test = load_test(engine, test_id).await?;
    let questions = engine.store().list_questions(test_id).await?;
    Ok(TestWithQuestions { test, questions })
}

pub(crate) async fn list_tests(
    engine: &Engine,
    status: Option<TestStatus>,
    skip: i64,
    limit: i64,
) -> LifecycleResult<Vec<Test>> {
    Ok(engine.store().list_tests(status, skip, limit).await?)
}

fn validate_question(question: &QuestionInput) -> LifecycleResult<()> {
    required_text("prompt", &question.prompt)?;

    let count = question.options.len();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
        return Err(LifecycleError::validation(format!(
            "a question needs between {MIN_OPTIONS} and {MAX_OPTIONS} options"
        )));
    }
    if question.options.iter().any(|option| option.trim().is_empty()) {
        return Err(LifecycleError::validation("options must not be empty"));
    }
    if question.correct_option < 0 || question.correct_option as usize >= count {
        return Err(LifecycleError::validation("correct_option is out of range"));
    }
    if question.points <= 0 {
        return Err(LifecycleError::validation("points must be positive"));
    }
    Ok(())
}

fn required_text(field: &str, value: &str) -> LifecycleResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn question_rows(
    test_id: &str,
    first_index: i32,
    questions: Vec<QuestionInput>,
    now: PrimitiveDateTime,
) -> Vec<NewQuestion> {
    questions
        .into_iter()
        .zip(first_index..)
        .map(|(question, order_index)| NewQuestion {
            id: Uuid::new_v4().to_string(),
            test_id: test_id.to_string(),
            prompt: question.prompt.trim().to_string(),
            options: question.options,
            correct_option: question.correct_option,
            points: question.points,
            order_index,
            created_at: now,
        })
        .collect()
}
