use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{error, info, instrument, warn};

use crate::error::SessionError;
use crate::gateway::SyncGateway;
use crate::notify::{Notice, Notifier};
use crate::reminder::ReminderScheduler;
use crate::snapshot::SnapshotSink;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft, TaskId};
use crate::timer::TimerBackend;
use crate::view::{ViewQuery, project};

/// One running client: owns the task store and the reminder timers built
/// from it. Dropping the session cancels every pending reminder.
pub struct Session<G: SyncGateway, T: TimerBackend> {
    store: TaskStore,
    reminders: ReminderScheduler<T>,
    gateway: G,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
    permission_requested: bool,
}

impl<G: SyncGateway, T: TimerBackend> Session<G, T> {
    pub fn new(
        gateway: G,
        timers: T,
        snapshot: Box<dyn SnapshotSink>,
        notifier: Arc<dyn Notifier>,
        timezone: Tz,
    ) -> Self {
        Self {
            store: TaskStore::new(snapshot),
            reminders: ReminderScheduler::new(timers, Arc::clone(&notifier), timezone),
            gateway,
            notifier,
            timezone,
            permission_requested: false,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    pub fn reminders(&self) -> &ReminderScheduler<T> {
        &self.reminders
    }

    pub fn pending_reminders(&self) -> Vec<TaskId> {
        self.reminders.pending_ids()
    }

    /// Asks for notification permission (first call only) and hydrates the
    /// store from the server. A failed fetch leaves the store empty.
    #[instrument(skip(self))]
    pub async fn boot(&mut self) -> Result<usize, SessionError> {
        if !self.permission_requested {
            let permission = self.notifier.request_permission();
            info!(?permission, "notification permission at startup");
            self.permission_requested = true;
        }

        match self.gateway.fetch_all().await {
            Ok(tasks) => {
                let count = tasks.len();
                self.store.load(tasks);
                self.after_change(Notice::Loaded { count });
                Ok(count)
            }
            Err(err) => {
                error!(error = %err, "initial task fetch failed");
                self.notifier.toast(&Notice::Network(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Validates locally, then creates through the server. Nothing is added
    /// until the server confirms.
    #[instrument(skip(self, draft), fields(text_len = draft.text.len()))]
    pub async fn add(&mut self, mut draft: TaskDraft) -> Result<TaskId, SessionError> {
        if let Err(err) = draft.validate() {
            warn!(error = %err, "rejected new task");
            self.notifier.toast(&Notice::Invalid(err.to_string()));
            return Err(err.into());
        }

        let task = match self.gateway.create(&draft).await {
            Ok(task) => task,
            Err(err) => {
                error!(error = %err, "creating task failed");
                self.notifier.toast(&Notice::Network(err.to_string()));
                return Err(err.into());
            }
        };

        let id = task.id.clone();
        let text = task.text.trim().to_string();
        if let Err(err) = self.store.add(task) {
            warn!(id = %id, error = %err, "server returned a task without text");
            self.notifier.toast(&Notice::Invalid(err.to_string()));
            return Err(err.into());
        }

        self.after_change(Notice::Added { text });
        Ok(id)
    }

    /// Flips completion locally. Unknown ids do nothing and return `None`.
    #[instrument(skip(self), fields(id = %id))]
    pub fn toggle(&mut self, id: &TaskId) -> Option<bool> {
        let completed = self.store.toggle_completed(id)?;
        let text = self
            .store
            .get(id)
            .map(|task| task.text.clone())
            .unwrap_or_default();
        self.after_change(Notice::Toggled { text, completed });
        Some(completed)
    }

    /// Deletes locally. Unknown ids do nothing and return `false`.
    #[instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.store.remove(id) else {
            return false;
        };
        self.after_change(Notice::Removed { text: task.text });
        true
    }

    pub fn view(&self, query: &ViewQuery) -> Vec<&Task> {
        project(self.store.tasks(), query, &self.timezone)
    }

    /// Loads the last local snapshot without contacting the server and
    /// without scheduling reminders.
    pub fn restore_snapshot(&mut self) -> anyhow::Result<bool> {
        self.store.restore()
    }

    #[instrument(skip(self))]
    pub fn shutdown(&mut self) {
        self.reminders.teardown();
        info!("session shut down; reminders cancelled");
    }

    fn after_change(&mut self, notice: Notice) {
        if let Err(err) = self.store.persist_snapshot() {
            error!(error = %format!("{err:#}"), "failed to persist snapshot");
            self.notifier.toast(&Notice::Storage(format!("{err:#}")));
        }
        self.notifier.toast(&notice);
        self.reminders.recompute(self.store.tasks());
    }
}
