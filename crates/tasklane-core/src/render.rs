use std::io::{self, IsTerminal, Write};

use chrono::{Local, NaiveDate};
use tasklane_shared::{TaskDto, TaskPriority, TaskStatus, User};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::dashboard::{PageInfo, StatusFilter};
use crate::preferences::ThemeMode;
use crate::todos::TaskCounts;

#[derive(Debug, Clone, Copy)]
struct Palette {
    row: &'static str,
    overdue: &'static str,
    done: &'static str,
    high: &'static str,
    error: &'static str,
}

const LIGHT: Palette = Palette {
    row: "34",
    overdue: "31",
    done: "90",
    high: "35",
    error: "31;1",
};

const DARK: Palette = Palette {
    row: "96",
    overdue: "91",
    done: "37;2",
    high: "95",
    error: "91;1",
};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    palette: Palette,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: ThemeMode) -> Self {
        let mut renderer = Self {
            color: cfg.get_bool("color").unwrap_or(true),
            palette: LIGHT,
        };
        renderer.set_theme(theme);
        renderer
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.palette = match theme {
            ThemeMode::Light => LIGHT,
            ThemeMode::Dark => DARK,
        };
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&self, tasks: &[TaskDto], page: PageInfo) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let today = Local::now().date_naive();

        if page.total == 0 {
            writeln!(out, "No tasks yet. Add one with `tasklane add <title>`.")?;
            return Ok(());
        }

        let rows = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| self.task_row(page.offset + idx + 1, task, today))
            .collect();

        write_table(&mut out, table_headers(), rows)?;
        writeln!(out)?;
        writeln!(
            out,
            "page {}/{} ({} tasks)",
            page.index + 1,
            page.count,
            page.total
        )?;
        Ok(())
    }

    fn task_row(&self, row: usize, task: &TaskDto, today: NaiveDate) -> Vec<String> {
        let status = match task.status {
            TaskStatus::Pending => "[ ]",
            TaskStatus::Completed => "[x]",
        };

        let due = task
            .due_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let due = match task.due_date {
            Some(date) if date < today && !task.is_completed() => {
                self.paint(&due, self.palette.overdue)
            }
            _ => due,
        };

        let priority = match task.priority {
            Some(TaskPriority::High) => self.paint("high", self.palette.high),
            Some(TaskPriority::Medium) => "medium".to_string(),
            Some(TaskPriority::Low) => "low".to_string(),
            None => String::new(),
        };

        let title = if task.is_completed() {
            self.paint(&task.title, self.palette.done)
        } else {
            task.title.clone()
        };

        vec![
            self.paint(&row.to_string(), self.palette.row),
            short_id(&task.id).to_string(),
            status.to_string(),
            due,
            priority,
            title,
        ]
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&self, task: &TaskDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status.as_str())?;
        writeln!(
            out,
            "desc      {}",
            task.description.clone().unwrap_or_default()
        )?;
        if let Some(priority) = task.priority {
            writeln!(out, "priority  {priority:?}")?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "due       {}", due.format("%Y-%m-%d"))?;
        }
        writeln!(out, "created   {}", task.created_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "updated   {}", task.updated_at.format("%Y-%m-%d %H:%M"))?;

        Ok(())
    }

    pub fn print_summary(&self, filter: StatusFilter, counts: TaskCounts) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}: {} total, {} to do, {} completed",
            filter.label(),
            counts.total(),
            counts.pending,
            counts.completed
        )?;
        Ok(())
    }

    pub fn print_user(&self, user: &User) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} <{}>", user.user_name, user.email)?;
        Ok(())
    }

    pub fn print_error(&self, message: &str) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", self.paint(message, self.palette.error))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn table_headers() -> Vec<String> {
    ["#", "ID", "Done", "Due", "Pri", "Title"]
        .iter()
        .map(|header| header.to_string())
        .collect()
}

/// Mongo-style ids are 24 hex chars; the tail is what differs between
/// records created close together.
fn short_id(id: &str) -> &str {
    let count = id.chars().count();
    if count <= 8 {
        return id;
    }
    let skip = count - 8;
    let start = id.char_indices().nth(skip).map(|(idx, _)| idx).unwrap_or(0);
    &id[start..]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["#".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[34m1\x1b[0m".to_string(), "Café".to_string()],
                vec!["10".to_string(), "x".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#  Title ");
        assert_eq!(lines[1], "-- ----- ");
        assert_eq!(strip_ansi(lines[2]), "1  Café  ");
        assert_eq!(lines[3], "10 x     ");
    }

    #[test]
    fn color_follows_config_flag() {
        let mut cfg = Config::default();
        assert!(Renderer::new(&cfg, ThemeMode::Light).color);

        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg, ThemeMode::Dark).color);

        cfg.apply_overrides([("color".to_string(), "Yes".to_string())]);
        assert!(Renderer::new(&cfg, ThemeMode::Dark).color);
    }

    #[test]
    fn short_id_keeps_tail() {
        assert_eq!(short_id("665f1c2b9e0a4d3f8c7b6a51"), "8c7b6a51");
        assert_eq!(short_id("42"), "42");
    }
}
