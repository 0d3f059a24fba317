use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::task::{Category, Credentials, NewTask, PasswordChange, Priority, Registration, Task};

pub const TITLE: &str = "title";
pub const CATEGORY: &str = "category";
pub const DUE_DATE: &str = "due_date";
pub const TASK: &str = "task";
pub const NAME: &str = "name";
pub const EMAIL: &str = "email";
pub const PASSWORD: &str = "password";
pub const OLD_PASSWORD: &str = "old_password";
pub const CONFIRM: &str = "confirm";

pub const MIN_PASSWORD_LEN: usize = 8;

/// Per-field messages collected before anything is sent to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first message recorded for a field.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields
            .iter()
            .map(|(field, message)| (*field, message.as_str()))
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            debug!(fields = self.len(), "form rejected");
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (_, message) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Parses a due date typed by the user: `today`, `tomorrow`, or
/// `YYYY-MM-DD`.
pub fn parse_due_date(input: &str, today: NaiveDate) -> Option<NaiveDate> {
    let token = input.trim();
    match token.to_ascii_lowercase().as_str() {
        "today" => Some(today),
        "tomorrow" => today.checked_add_signed(Duration::days(1)),
        _ => NaiveDate::parse_from_str(token, "%Y-%m-%d").ok(),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    Weak,
    Mild,
    Strong,
    VeryStrong,
}

impl Strength {
    pub fn label(self) -> &'static str {
        match self {
            Self::Weak => "Weak",
            Self::Mild => "Mild",
            Self::Strong => "Strong",
            Self::VeryStrong => "Very Strong",
        }
    }
}

/// Score 0..=4: one point each for length, mixed case, a digit and a
/// symbol.
pub fn password_score(password: &str) -> u8 {
    if password.is_empty() {
        return 0;
    }
    let mut score = 0;
    if password.chars().count() >= MIN_PASSWORD_LEN {
        score += 1;
    }
    if password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
    {
        score += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        score += 1;
    }
    score
}

pub fn password_strength(password: &str) -> Option<Strength> {
    match password_score(password) {
        1 => Some(Strength::Weak),
        2 => Some(Strength::Mild),
        3 => Some(Strength::Strong),
        4 => Some(Strength::VeryStrong),
        _ => None,
    }
}

/// The add/edit task form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub id: Option<String>,
    pub title: String,
    pub priority: Priority,
    pub due_date: String,
    pub category_id: String,
    pub completed: bool,
}

impl TaskDraft {
    /// An empty form with the first category preselected.
    pub fn for_categories(categories: &[Category]) -> Self {
        Self {
            category_id: categories
                .first()
                .map(|category| category.id.clone())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            id: Some(task.id.clone()),
            title: task.title.clone(),
            priority: task.priority,
            due_date: task.due_date.map(crate::task::format_date).unwrap_or_default(),
            category_id: task.category_id.clone(),
            completed: task.completed,
        }
    }

    fn check_common(&self, errors: &mut ValidationErrors) {
        if self.title.trim().is_empty() {
            errors.add(TITLE, "Title is required.");
        }
        if self.category_id.trim().is_empty() {
            errors.add(CATEGORY, "Category is required.");
        }
    }

    pub fn validate_new(&self, today: NaiveDate) -> Result<NewTask, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.check_common(&mut errors);

        let due_date = if self.due_date.trim().is_empty() {
            errors.add(DUE_DATE, "Due date is required.");
            None
        } else {
            let parsed = parse_due_date(&self.due_date, today);
            if parsed.is_none() {
                errors.add(DUE_DATE, "Due date must be YYYY-MM-DD.");
            }
            parsed
        };

        let due_date = due_date.unwrap_or(today);
        errors.finish(|| NewTask {
            title: self.title.trim().to_string(),
            priority: self.priority,
            due_date,
            category_id: self.category_id.clone(),
        })
    }

    /// Tasks that came from the server without a due date may be saved
    /// without one.
    pub fn validate_edit(&self, today: NaiveDate) -> Result<Task, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.id.is_none() {
            errors.add(TASK, "No task selected.");
        }
        self.check_common(&mut errors);

        let due_date = if self.due_date.trim().is_empty() {
            None
        } else {
            let parsed = parse_due_date(&self.due_date, today);
            if parsed.is_none() {
                errors.add(DUE_DATE, "Due date must be YYYY-MM-DD.");
            }
            parsed
        };

        let id = self.id.clone().unwrap_or_default();
        errors.finish(|| Task {
            id,
            title: self.title.trim().to_string(),
            priority: self.priority,
            due_date,
            category_id: self.category_id.clone(),
            completed: self.completed,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
}

impl CategoryDraft {
    pub fn validate(&self) -> Result<String, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.add(NAME, "Category name is required.");
        }
        errors.finish(|| name.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordDraft {
    pub old_password: String,
    pub new_password: String,
    pub confirm: String,
}

impl PasswordDraft {
    pub fn validate(&self) -> Result<PasswordChange, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.old_password.is_empty() {
            errors.add(OLD_PASSWORD, "Current password is required.");
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(PASSWORD, "Password must be at least 8 characters long.");
        }
        if self.new_password != self.confirm {
            errors.add(CONFIRM, "Passwords do not match");
        }
        errors.finish(|| PasswordChange {
            old_password: self.old_password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginDraft {
    pub email: String,
    pub password: String,
}

impl LoginDraft {
    pub fn validate(&self) -> Result<Credentials, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let email = self.email.trim();
        if !is_valid_email(email) {
            errors.add(EMAIL, "Please enter a valid email address.");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(PASSWORD, "Password must be at least 8 characters long.");
        }
        errors.finish(|| Credentials {
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupDraft {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

impl SignupDraft {
    pub fn validate(&self) -> Result<Registration, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.add(NAME, "Name is required.");
        }
        let email = self.email.trim();
        if !is_valid_email(email) {
            errors.add(EMAIL, "Please enter a valid email address.");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(PASSWORD, "Password must be at least 8 characters long.");
        }
        if self.password != self.confirm {
            errors.add(CONFIRM, "Passwords do not match");
        }
        errors.finish(|| Registration {
            name: name.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}
