use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use derivative::Derivative;
use thiserror::Error;

pub const DUE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Derivative)]
#[derivative(Default)]
pub enum Priority {
    High,
    #[derivative(Default)]
    Medium,
    Low,
}

#[derive(Debug, Error)]
#[error("unknown priority '{0}': expected high|medium|low")]
pub struct ParsePriorityError(String);

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    // Cycle forward through the fixed choices, wrapping around
    pub fn next(self) -> Priority {
        match self {
            Priority::High => Priority::Medium,
            Priority::Medium => Priority::Low,
            Priority::Low => Priority::High,
        }
    }

    pub fn previous(self) -> Priority {
        match self {
            Priority::High => Priority::Low,
            Priority::Medium => Priority::High,
            Priority::Low => Priority::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

// A task document as the store hands it out
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: Priority,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub order: Option<i64>,
}

impl Task {
    // The due date is free text; only well formed dates take part in date math
    pub fn parsed_due_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.due_date.trim(), DUE_DATE_FORMAT).ok()
    }
}

// Fields of a task that has not been written yet
#[derive(Debug, Clone, PartialEq, Derivative)]
#[derivative(Default)]
pub struct TaskDraft {
    pub name: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn to_new_task(&self, user_id: &str) -> NewTask {
        NewTask {
            name: self.name.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due_date.clone(),
            priority: self.priority,
            user_id: user_id.to_string(),
        }
    }
}

// Payload of a create write. Id and creation time are left to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub title: String,
    pub description: String,
    pub due_date: String,
    pub priority: Priority,
    pub user_id: String,
}
