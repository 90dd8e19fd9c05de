use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprig_shared::{Priority, Tag, TodoCreate, TodoDto};

use crate::datetime::DueDate;
use crate::error::{GatewayError, ValidationError};

/// Server-assigned identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tag: Tag,
    #[serde(default)]
    pub due_date: Option<DueDate>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            priority: Priority::default(),
            tag: Tag::default(),
            due_date: None,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.completed
    }
}

impl TryFrom<TodoDto> for Task {
    type Error = GatewayError;

    fn try_from(dto: TodoDto) -> Result<Self, Self::Error> {
        let due_date = dto
            .due_date
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(str::parse::<DueDate>)
            .transpose()
            .map_err(|err| GatewayError::Decode(format!("todo {}: {err}", dto.id)))?;

        let created_at = DateTime::parse_from_rfc3339(&dto.created_at)
            .map_err(|err| GatewayError::Decode(format!("todo {} createdAt: {err}", dto.id)))?
            .with_timezone(&Utc);

        Ok(Self {
            id: TaskId::new(dto.id),
            text: dto.text,
            completed: dto.completed,
            priority: dto.priority,
            tag: dto.tag,
            due_date,
            created_at,
        })
    }
}

/// User input for a new task, before the server has assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDraft {
    pub text: String,
    pub priority: Priority,
    pub tag: Tag,
    pub due_date: Option<DueDate>,
}

impl TaskDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_due(mut self, due: DueDate) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Trims the text in place and rejects drafts that end up empty.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if trimmed.len() != self.text.len() {
            self.text = trimmed.to_string();
        }
        Ok(())
    }

    pub fn to_request(&self) -> TodoCreate {
        TodoCreate {
            text: self.text.clone(),
            priority: Some(self.priority),
            tag: Some(self.tag),
            due_date: self.due_date.map(|due| due.to_string()),
        }
    }
}
