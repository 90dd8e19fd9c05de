use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono_tz::Tz;
use clap::ValueEnum;
use sprig_shared::Tag;

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => task.is_active(),
            StatusFilter::Completed => task.completed,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" | "pending" | "open" => Ok(StatusFilter::Active),
            "completed" | "done" => Ok(StatusFilter::Completed),
            other => Err(anyhow!("unknown filter: {other}")),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortRule {
    /// High before medium before low.
    #[default]
    Priority,
    /// Earliest due first, undated last.
    Due,
    /// Insertion order.
    Added,
}

impl FromStr for SortRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(SortRule::Priority),
            "due" => Ok(SortRule::Due),
            "added" | "created" => Ok(SortRule::Added),
            other => Err(anyhow!("unknown sort rule: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewQuery {
    pub status: StatusFilter,
    pub tag: Option<Tag>,
    pub sort: SortRule,
}

impl ViewQuery {
    pub fn status(status: StatusFilter) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }
}

/// Filtered and sorted view over `tasks`. Always computed from scratch;
/// every sort is stable so ties keep insertion order.
pub fn project<'a>(tasks: &'a [Task], query: &ViewQuery, timezone: &Tz) -> Vec<&'a Task> {
    let mut out: Vec<&Task> = tasks
        .iter()
        .filter(|task| query.status.matches(task))
        .filter(|task| query.tag.is_none_or(|tag| task.tag == tag))
        .collect();

    match query.sort {
        SortRule::Priority => out.sort_by_key(|task| task.priority.rank()),
        SortRule::Due => out.sort_by_key(|task| {
            let due = task.due_date.and_then(|due| due.instant_in(timezone));
            (due.is_none(), due)
        }),
        SortRule::Added => {}
    }

    out
}
