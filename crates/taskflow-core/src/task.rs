use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use taskflow_wire::{ListDto, TaskCreate, TaskDto, TaskPriority, TaskReplace, UserDto};

use crate::error::SyncError;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Sort rank: lower comes first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Self::High),
            "medium" | "m" => Ok(Self::Medium),
            "low" | "l" => Ok(Self::Low),
            other => Err(anyhow!("unknown priority: {other}")),
        }
    }
}

impl From<TaskPriority> for Priority {
    fn from(value: TaskPriority) -> Self {
        match value {
            TaskPriority::High => Self::High,
            TaskPriority::Medium => Self::Medium,
            TaskPriority::Low => Self::Low,
        }
    }
}

impl From<Priority> for TaskPriority {
    fn from(value: Priority) -> Self {
        match value {
            Priority::High => Self::High,
            Priority::Medium => Self::Medium,
            Priority::Low => Self::Low,
        }
    }
}

/// Completion status as the filter panel names it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Completed,
    Pending,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" | "done" => Ok(Self::Completed),
            "pending" | "open" => Ok(Self::Pending),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub category_id: String,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn status(&self) -> Status {
        if self.completed {
            Status::Completed
        } else {
            Status::Pending
        }
    }

    pub(crate) fn to_replace(&self) -> TaskReplace {
        TaskReplace {
            title: self.title.clone(),
            priority: self.priority.into(),
            due_date: self.due_date.map(format_date),
            list_id: self.category_id.clone(),
            is_completed: self.completed,
        }
    }
}

impl TryFrom<TaskDto> for Task {
    type Error = SyncError;

    fn try_from(dto: TaskDto) -> Result<Self, Self::Error> {
        let due_date = match dto.due_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(parse_remote_date(raw).ok_or_else(|| {
                SyncError::Decode(format!("task {} has unreadable dueDate {raw:?}", dto.id))
            })?),
            _ => None,
        };

        Ok(Self {
            id: dto.id,
            title: dto.title,
            priority: dto.priority.into(),
            due_date,
            category_id: dto.list_id,
            completed: dto.is_completed,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl From<ListDto> for Category {
    fn from(dto: ListDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
        }
    }
}

/// A validated task that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub due_date: NaiveDate,
    pub category_id: String,
}

impl NewTask {
    pub(crate) fn to_create(&self) -> TaskCreate {
        TaskCreate {
            title: self.title.clone(),
            priority: self.priority.into(),
            due_date: format_date(self.due_date),
            list_id: self.category_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            email: dto.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts a bare `YYYY-MM-DD` or a full RFC 3339 timestamp.
fn parse_remote_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|stamp| stamp.date_naive())
}
