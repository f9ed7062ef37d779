use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "teststatus", rename_all = "lowercase")]
pub(crate) enum TestStatus {
    Draft,
    Scheduled,
    Active,
    Completed,
}

impl TestStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Timing fields may only change before the test opens.
    pub(crate) fn timing_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Completed,
    TimedOut,
}

impl AttemptStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_as_wire_names() {
        assert_eq!(serde_json::to_value(TestStatus::Scheduled).unwrap(), "scheduled");
        assert_eq!(serde_json::to_value(AttemptStatus::TimedOut).unwrap(), "timed_out");
        assert_eq!(AttemptStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn only_pre_open_statuses_allow_timing_edits() {
        assert!(TestStatus::Draft.timing_editable());
        assert!(TestStatus::Scheduled.timing_editable());
        assert!(!TestStatus::Active.timing_editable());
        assert!(!TestStatus::Completed.timing_editable());
    }
}
