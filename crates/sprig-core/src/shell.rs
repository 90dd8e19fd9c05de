use std::io::Write;

use anyhow::anyhow;
use sprig_shared::{Priority, Tag};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, instrument, warn};

use crate::datetime::DueDate;
use crate::gateway::SyncGateway;
use crate::render::Renderer;
use crate::session::Session;
use crate::task::{Task, TaskDraft, TaskId};
use crate::timer::TimerBackend;
use crate::view::{SortRule, StatusFilter, ViewQuery};

const HELP: &str = "\
commands:
  ls [all|active|completed] [tag:T] [sort:priority|due|added]
  add TEXT... [priority:P] [tag:T] [due:D]
  done REF | toggle REF      flip completion
  rm REF                     delete
  reminders                  list pending reminders
  help | quit
REF is a row number from the last listing or an id prefix.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List(ViewQuery),
    Add(TaskDraft),
    Toggle(String),
    Remove(String),
    Reminders,
    Help,
    Quit,
    Nothing,
}

#[instrument(skip(defaults))]
pub fn parse_line(line: &str, defaults: &ViewQuery) -> anyhow::Result<ShellCommand> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(ShellCommand::Nothing);
    };
    let rest: Vec<&str> = words.collect();

    match head.to_ascii_lowercase().as_str() {
        "ls" | "list" => parse_list(&rest, defaults).map(ShellCommand::List),
        "add" | "a" => parse_add(&rest).map(ShellCommand::Add),
        "done" | "toggle" | "t" => single_ref(head, &rest).map(ShellCommand::Toggle),
        "rm" | "delete" | "del" => single_ref(head, &rest).map(ShellCommand::Remove),
        "reminders" => Ok(ShellCommand::Reminders),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
        other => Err(anyhow!("unknown command '{other}'; try 'help'")),
    }
}

fn single_ref(head: &str, rest: &[&str]) -> anyhow::Result<String> {
    match rest {
        [reference] => Ok((*reference).to_string()),
        _ => Err(anyhow!("{head}: expected exactly one task reference")),
    }
}

fn parse_list(args: &[&str], defaults: &ViewQuery) -> anyhow::Result<ViewQuery> {
    let mut query = *defaults;
    for arg in args {
        if let Some((key, value)) = arg.split_once(':') {
            match key.to_ascii_lowercase().as_str() {
                "tag" => query.tag = Some(value.parse::<Tag>().map_err(|e| anyhow!(e))?),
                "sort" => query.sort = value.parse::<SortRule>()?,
                other => return Err(anyhow!("ls: unknown option '{other}'")),
            }
        } else {
            query.status = arg.parse::<StatusFilter>()?;
        }
    }
    Ok(query)
}

fn parse_add(args: &[&str]) -> anyhow::Result<TaskDraft> {
    let mut words = Vec::new();
    let mut draft = TaskDraft::default();

    for arg in args {
        let modifier = arg
            .split_once(':')
            .map(|(key, value)| (key.to_ascii_lowercase(), value));
        match modifier {
            Some((key, value)) if key == "pri" || key == "priority" => {
                draft.priority = value.parse::<Priority>().map_err(|e| anyhow!(e))?;
            }
            Some((key, value)) if key == "tag" => {
                draft.tag = value.parse::<Tag>().map_err(|e| anyhow!(e))?;
            }
            Some((key, value)) if key == "due" => {
                draft.due_date = Some(value.parse::<DueDate>()?);
            }
            _ => words.push(*arg),
        }
    }

    draft.text = words.join(" ");
    Ok(draft)
}

/// Row number from the last listing, or a unique id prefix.
pub fn resolve_ref(reference: &str, listing: &[TaskId], tasks: &[Task]) -> Option<TaskId> {
    if let Ok(row) = reference.parse::<usize>()
        && row >= 1
        && row <= listing.len()
    {
        return Some(listing[row - 1].clone());
    }

    let mut matches = tasks
        .iter()
        .filter(|task| task.id.as_str().starts_with(reference));
    let first = matches.next()?;
    if matches.next().is_some() {
        debug!(reference, "ambiguous id prefix");
        return None;
    }
    Some(first.id.clone())
}

/// Whether the shell keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct Shell {
    renderer: Renderer,
    defaults: ViewQuery,
    listing: Vec<TaskId>,
}

impl Shell {
    pub fn new(renderer: Renderer, defaults: ViewQuery) -> Self {
        Self {
            renderer,
            defaults,
            listing: Vec::new(),
        }
    }

    /// Boots the session, then reads commands until `quit`, end of input or
    /// Ctrl-C. Always tears the session down before returning.
    pub async fn run<G, T, R, W>(
        &mut self,
        session: &mut Session<G, T>,
        input: R,
        out: &mut W,
    ) -> anyhow::Result<()>
    where
        G: SyncGateway,
        T: TimerBackend,
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        if let Err(err) = session.boot().await {
            warn!(error = %err, "starting with an empty task list");
        }
        let defaults = self.defaults;
        self.list(session, &defaults, out)?;

        let result = self.read_loop(session, input, out).await;
        session.shutdown();
        result
    }

    async fn read_loop<G, T, R, W>(
        &mut self,
        session: &mut Session<G, T>,
        input: R,
        out: &mut W,
    ) -> anyhow::Result<()>
    where
        G: SyncGateway,
        T: TimerBackend,
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            write!(out, "sprig> ")?;
            out.flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    None
                }
            };
            let Some(line) = line else {
                writeln!(out)?;
                return Ok(());
            };

            let command = match parse_line(&line, &self.defaults) {
                Ok(command) => command,
                Err(err) => {
                    writeln!(out, "! {err:#}")?;
                    continue;
                }
            };
            if self.execute(session, command, out).await? == Flow::Stop {
                return Ok(());
            }
        }
    }

    #[instrument(skip(self, session, out))]
    pub async fn execute<G, T, W>(
        &mut self,
        session: &mut Session<G, T>,
        command: ShellCommand,
        out: &mut W,
    ) -> anyhow::Result<Flow>
    where
        G: SyncGateway,
        T: TimerBackend,
        W: Write,
    {
        match command {
            ShellCommand::Nothing => {}
            ShellCommand::Help => writeln!(out, "{HELP}")?,
            ShellCommand::Quit => return Ok(Flow::Stop),
            ShellCommand::List(query) => self.list(session, &query, out)?,
            ShellCommand::Add(draft) => {
                // Failures are already reported through the notifier.
                let _ = session.add(draft).await;
            }
            ShellCommand::Toggle(reference) => {
                let toggled = resolve_ref(&reference, &self.listing, session.tasks())
                    .and_then(|id| session.toggle(&id));
                if toggled.is_none() {
                    writeln!(out, "! no task matches '{reference}'")?;
                }
            }
            ShellCommand::Remove(reference) => {
                // Rows of the last listing keep their numbers; a removed row
                // stays dead until the next `ls`.
                let removed = resolve_ref(&reference, &self.listing, session.tasks())
                    .is_some_and(|id| session.remove(&id));
                if !removed {
                    writeln!(out, "! no task matches '{reference}'")?;
                }
            }
            ShellCommand::Reminders => {
                let pending = session.pending_reminders();
                if pending.is_empty() {
                    writeln!(out, "No pending reminders.")?;
                }
                for id in pending {
                    if let Some(task) = session.get(&id)
                        && let Some(due) = task.due_date
                    {
                        writeln!(
                            out,
                            "{}  {}  {}",
                            due.label_in(session.timezone()),
                            task.tag,
                            task.text
                        )?;
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn list<G, T, W>(
        &mut self,
        session: &Session<G, T>,
        query: &ViewQuery,
        out: &mut W,
    ) -> anyhow::Result<()>
    where
        G: SyncGateway,
        T: TimerBackend,
        W: Write,
    {
        let view = session.view(query);
        self.listing = view.iter().map(|task| task.id.clone()).collect();
        self.renderer
            .write_task_table(out, &view, session.reminders().now())
    }
}
