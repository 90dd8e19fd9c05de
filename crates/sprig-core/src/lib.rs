pub mod cli;
pub mod config;
pub mod datetime;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod reminder;
pub mod render;
pub mod session;
pub mod shell;
pub mod snapshot;
pub mod store;
pub mod task;
pub mod timer;
pub mod view;

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use anyhow::{
  Context,
  bail
};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{
  debug,
  info
};

use crate::cli::Command;
use crate::config::Config;
use crate::gateway::{
  HttpGateway,
  SyncGateway
};
use crate::notify::{
  Notifier,
  TerminalNotifier
};
use crate::render::Renderer;
use crate::session::Session;
use crate::shell::Shell;
use crate::snapshot::FileSnapshot;
use crate::task::{
  TaskDraft,
  TaskId
};
use crate::timer::{
  TimerBackend,
  TokioTimers
};
use crate::view::ViewQuery;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting sprig"
  );

  let mut cfg = Config::load(
    cli.sprigrc.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(files = ?cfg.loaded_files, "configuration loaded");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let timezone = cfg.timezone()?;
  let renderer =
    Renderer::new(&cfg, timezone);
  let defaults = ViewQuery {
    status: cfg.default_filter()?,
    tag:    None,
    sort:   cfg.default_sort()?
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;

  let outcome = runtime.block_on(dispatch(
    cli.command.unwrap_or(
      Command::Shell
    ),
    &cfg,
    &data_dir,
    timezone,
    renderer,
    defaults
  ));
  // A pending stdin read would
  // otherwise hold shutdown until the
  // next newline.
  runtime.shutdown_background();
  outcome?;

  info!("done");
  Ok(())
}

#[tracing::instrument(skip(
  cfg, renderer, defaults
))]
async fn dispatch(
  command: Command,
  cfg: &Config,
  data_dir: &Path,
  timezone: Tz,
  renderer: Renderer,
  defaults: ViewQuery
) -> anyhow::Result<()> {
  let notifier: Arc<dyn Notifier> =
    Arc::new(TerminalNotifier::new(
      cfg.notification_permission()
    ));
  let gateway =
    HttpGateway::new(&cfg.server_url())?;
  let snapshot =
    FileSnapshot::open(data_dir)
      .with_context(|| {
        format!(
          "failed to open snapshot in \
           {}",
          data_dir.display()
        )
      })?;

  let mut session = Session::new(
    gateway,
    TokioTimers::new()?,
    Box::new(snapshot),
    notifier,
    timezone
  );

  match command {
    | Command::List {
      filter,
      tag,
      sort,
      offline
    } => {
      let query = ViewQuery {
        status: filter
          .unwrap_or(defaults.status),
        tag:    tag.or(defaults.tag),
        sort:   sort
          .unwrap_or(defaults.sort)
      };

      if offline {
        if !session.restore_snapshot()? {
          info!("no local snapshot yet");
        }
      } else if session
        .boot()
        .await
        .is_err()
      {
        // Already reported as a notice.
        return Ok(());
      }

      renderer.print_task_table(
        &session.view(&query),
        Utc::now()
      )?;
    }
    | Command::Add {
      text,
      priority,
      tag,
      due
    } => {
      let mut draft =
        TaskDraft::new(text.join(" "));
      if let Some(priority) = priority {
        draft =
          draft.with_priority(priority);
      }
      if let Some(tag) = tag {
        draft = draft.with_tag(tag);
      }
      if let Some(due) = due {
        draft = draft.with_due(due);
      }

      let id = add_after_boot(
        &mut session,
        draft
      )
      .await?;
      debug!(id = %id, "task created");
    }
    | Command::Shell => {
      let mut shell =
        Shell::new(renderer, defaults);
      let input =
        BufReader::new(tokio::io::stdin());
      let mut out = std::io::stdout();
      shell
        .run(&mut session, input, &mut out)
        .await?;
    }
  }

  session.shutdown();
  Ok(())
}

/// The session has already shown a
/// notice for any failure, so the
/// returned error stays short.
async fn add_after_boot<G, T>(
  session: &mut Session<G, T>,
  draft: TaskDraft
) -> anyhow::Result<TaskId>
where
  G: SyncGateway,
  T: TimerBackend
{
  // Hydrate first so the snapshot
  // written after the add holds the
  // whole list.
  if session.boot().await.is_err() {
    bail!(
      "task server unreachable; \
       nothing was added"
    );
  }

  match session.add(draft).await {
    | Ok(id) => Ok(id),
    | Err(err) => {
      debug!(error = %err, "add failed");
      bail!("nothing was added")
    }
  }
}
