use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sprig_shared::Priority;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::task::Task;

const ID_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    timezone: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config, timezone: Tz) -> Self {
        Self {
            color: color_enabled(cfg, io::stdout().is_terminal()),
            timezone,
        }
    }

    pub fn plain(timezone: Tz) -> Self {
        Self {
            color: false,
            timezone,
        }
    }

    /// Numbered table; row numbers are what the shell accepts as references.
    #[tracing::instrument(skip(self, out, tasks, now), fields(count = tasks.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Done".to_string(),
            "Pri".to_string(),
            "Tag".to_string(),
            "Due".to_string(),
            "Text".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let id: String = task.id.as_str().chars().take(ID_PREFIX_LEN).collect();
            let done = if task.completed { "x" } else { "" }.to_string();

            let priority = match task.priority {
                Priority::High => self.paint(task.priority.as_str(), "31"),
                _ => task.priority.to_string(),
            };

            let due = match task.due_date {
                Some(due) => {
                    let label = due.label_in(&self.timezone);
                    let overdue = due
                        .instant_in(&self.timezone)
                        .is_some_and(|at| at < now && !task.completed);
                    if overdue { self.paint(&label, "31") } else { label }
                }
                None => String::new(),
            };

            let text = if task.completed {
                self.paint(&task.text, "2")
            } else {
                task.text.clone()
            };

            rows.push(vec![
                (idx + 1).to_string(),
                self.paint(&id, "33"),
                done,
                priority,
                task.tag.to_string(),
                due,
                text,
            ]);
        }

        write_table(out, headers, rows)
    }

    pub fn print_task_table(&self, tasks: &[&Task], now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, tasks, now)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    writer: &mut W,
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

    let mut line = String::new();
    for idx in 0..column_count {
        line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
    }
    writeln!(writer, "{}", line.trim_end())?;

    line.clear();
    for width in &widths {
        line.push_str(&format!("{:-<width$} ", "", width = *width));
    }
    writeln!(writer, "{}", line.trim_end())?;

    for row in rows {
        line.clear();
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding + 1));
        }
        writeln!(writer, "{}", line.trim_end())?;
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

/// `color` defaults to on; output that is not a terminal never gets color.
fn color_enabled(cfg: &Config, terminal: bool) -> bool {
    terminal && cfg.get_bool("color").unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sprig_shared::{Priority, Tag};

    use super::{Renderer, color_enabled, strip_ansi};
    use crate::config::Config;
    use crate::task::{Task, TaskId};

    #[test]
    fn table_aligns_wide_text_and_numbers_rows() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let mut milk = Task::new(TaskId::new("0123456789abcdef"), "Buy milk 🥛", now);
        milk.tag = Tag::Shopping;
        milk.priority = Priority::High;
        milk.due_date = Some("2026-10-18".parse().expect("due"));
        let mut done = Task::new(TaskId::new("feed"), "Report", now);
        done.completed = true;

        let renderer = Renderer::plain(chrono_tz::UTC);
        let mut out = Vec::new();
        renderer
            .write_task_table(&mut out, &[&milk, &done], now)
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("# ID"));
        assert!(lines[2].starts_with("1 01234567"));
        assert!(lines[2].contains("2026-10-18"));
        assert!(lines[2].ends_with("Buy milk 🥛"));
        assert!(lines[3].starts_with("2 feed"));
        assert!(lines[3].contains(" x "));
    }

    #[test]
    fn empty_listing_says_so() {
        let renderer = Renderer::plain(chrono_tz::UTC);
        let mut out = Vec::new();
        renderer
            .write_task_table(&mut out, &[], Utc::now())
            .expect("render");
        assert_eq!(String::from_utf8(out).expect("utf8"), "No tasks.\n");
    }

    #[test]
    fn color_setting_goes_through_config_booleans() {
        let mut cfg = Config::default();
        assert!(color_enabled(&cfg, true));
        assert!(!color_enabled(&cfg, false));

        cfg.apply_overrides([("rc.color".to_string(), "no".to_string())]);
        assert!(!color_enabled(&cfg, true));
        cfg.apply_overrides([("color".to_string(), "Yes".to_string())]);
        assert!(color_enabled(&cfg, true));
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
