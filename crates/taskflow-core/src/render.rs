use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::task::{Category, Priority, Task, User, format_date};
use crate::validate::{Strength, password_strength};
use crate::view::TaskGroups;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_task_groups(
        &self,
        heading: &str,
        groups: &TaskGroups<'_>,
        all: &[Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_groups(&mut out, heading, groups, all, categories, today)
    }

    pub fn write_task_groups<W: Write>(
        &self,
        mut out: W,
        heading: &str,
        groups: &TaskGroups<'_>,
        all: &[Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(heading, "1"))?;
        writeln!(out)?;

        if groups.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        if groups.pending.is_empty() {
            writeln!(out, "Nothing pending.")?;
        } else {
            self.write_task_table(&mut out, &groups.pending, all, categories, today)?;
        }

        if !groups.completed.is_empty() {
            writeln!(out)?;
            if groups.show_completed {
                writeln!(out, "Completed ({})", groups.completed.len())?;
                self.write_task_table(&mut out, &groups.completed, all, categories, today)?;
            } else {
                writeln!(
                    out,
                    "Completed ({}) hidden; pass --show-completed to list them.",
                    groups.completed.len()
                )?;
            }
        }

        Ok(())
    }

    fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[&Task],
        all: &[Task],
        categories: &[Category],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Category".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = self.paint(short_id(&task.id, all), "33");

            let priority = match task.priority {
                Priority::High => self.paint("High", "31"),
                Priority::Medium => self.paint("Medium", "33"),
                Priority::Low => self.paint("Low", "32"),
            };

            let due = task.due_date.map(format_date).unwrap_or_default();
            let due = match task.due_date {
                Some(date) if date < today && !task.completed => self.paint(&due, "31"),
                _ => due,
            };

            let category = categories
                .iter()
                .find(|category| category.id == task.category_id)
                .map(|category| category.name.clone())
                .unwrap_or_else(|| "-".to_string());

            let title = if task.completed {
                self.paint(&task.title, "9")
            } else {
                task.title.clone()
            };

            rows.push(vec![id, priority, due, category, title]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_categories(&self, categories: &[Category], tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if categories.is_empty() {
            writeln!(out, "No categories. Create one with `taskflow category add <name>`.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Pending".to_string(),
            "Total".to_string(),
        ];
        let rows = categories
            .iter()
            .map(|category| {
                let filed = tasks.iter().filter(|task| task.category_id == category.id);
                let total = filed.clone().count();
                let pending = filed.filter(|task| !task.completed).count();
                vec![
                    self.paint(&category.id, "33"),
                    category.name.clone(),
                    pending.to_string(),
                    total.to_string(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    pub fn print_user(&self, user: &User) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "name   {}", user.name)?;
        writeln!(out, "email  {}", user.email)?;
        if let Some(id) = &user.id {
            writeln!(out, "id     {id}")?;
        }
        Ok(())
    }

    /// Strength label for a new password, empty when it scores zero.
    pub fn strength_hint(&self, password: &str) -> String {
        match password_strength(password) {
            Some(strength) => {
                let code = match strength {
                    Strength::Weak => "31",
                    Strength::Mild => "33",
                    Strength::Strong => "36",
                    Strength::VeryStrong => "32",
                };
                self.paint(strength.label(), code)
            }
            None => String::new(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub const SHORT_ID_LEN: usize = 6;

/// Shortest tail of `id`, at least [`SHORT_ID_LEN`] characters, that no other
/// task id in `tasks` starts or ends with.
pub fn short_id<'a>(id: &'a str, tasks: &[Task]) -> &'a str {
    let mut len = SHORT_ID_LEN;
    loop {
        let tail = id_tail(id, len);
        let clash = tasks.iter().any(|task| {
            task.id != id && (task.id.ends_with(tail) || task.id.starts_with(tail))
        });
        if !clash || tail.len() == id.len() {
            return tail;
        }
        len += 1;
    }
}

fn id_tail(id: &str, len: usize) -> &str {
    match id.char_indices().rev().nth(len.saturating_sub(1)) {
        Some((idx, _)) => &id[idx..],
        None => id,
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
