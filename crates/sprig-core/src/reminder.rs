use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::notify::{Notice, NotificationPermission, Notifier, Reminder};
use crate::task::{Task, TaskId};
use crate::timer::{TimerBackend, TimerToken};

const REMINDER_TITLE: &str = "Task due";

/// Keeps exactly one pending timer per incomplete task whose due instant is
/// still ahead. The registry is rebuilt from scratch on every recompute.
pub struct ReminderScheduler<T: TimerBackend> {
    backend: T,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
    registry: HashMap<TaskId, TimerToken>,
}

impl<T: TimerBackend> ReminderScheduler<T> {
    pub fn new(backend: T, notifier: Arc<dyn Notifier>, timezone: Tz) -> Self {
        Self {
            backend,
            notifier,
            timezone,
            registry: HashMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.backend.now()
    }

    /// Cancels every timer, then schedules one per task still worth
    /// reminding about. Past or present due instants get nothing.
    #[tracing::instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub fn recompute(&mut self, tasks: &[Task]) -> usize {
        self.teardown();

        let now = self.backend.now();
        for task in tasks {
            if task.completed {
                continue;
            }
            let Some(due) = task.due_date.and_then(|due| due.instant_in(&self.timezone)) else {
                continue;
            };
            if due <= now {
                debug!(id = %task.id, due = %due, "due instant already passed; no reminder");
                continue;
            }

            let reminder = Reminder {
                task_id: task.id.clone(),
                text: task.text.clone(),
                tag: task.tag,
                due,
            };
            let notifier = Arc::clone(&self.notifier);
            let token = self
                .backend
                .schedule_at(due, Box::new(move || deliver_reminder(notifier.as_ref(), &reminder)));
            self.registry.insert(task.id.clone(), token);
        }

        debug!(scheduled = self.registry.len(), "reminders recomputed");
        self.registry.len()
    }

    /// Cancels every pending timer.
    pub fn teardown(&mut self) {
        for (_, token) in self.registry.drain() {
            self.backend.cancel(token);
        }
    }

    pub fn has_pending(&self, id: &TaskId) -> bool {
        self.registry
            .get(id)
            .is_some_and(|token| self.backend.is_pending(*token))
    }

    /// Ids with a timer that has neither fired nor been cancelled, sorted.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .registry
            .iter()
            .filter(|(_, token)| self.backend.is_pending(**token))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl<T: TimerBackend> Drop for ReminderScheduler<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub fn deliver_reminder(notifier: &dyn Notifier, reminder: &Reminder) {
    info!(id = %reminder.task_id, tag = %reminder.tag, "reminder fired");
    if notifier.permission() == NotificationPermission::Granted {
        let body = format!("{} [{}]", reminder.text, reminder.tag);
        notifier.notify(REMINDER_TITLE, &body);
    }
    notifier.toast(&Notice::Reminder {
        text: reminder.text.clone(),
        tag: reminder.tag,
    });
}
