use tracing::{debug, info};

use crate::error::ValidationError;
use crate::snapshot::SnapshotSink;
use crate::task::{Task, TaskId};

/// The session's authoritative task collection, in insertion order.
pub struct TaskStore {
    tasks: Vec<Task>,
    snapshot: Box<dyn SnapshotSink>,
}

impl TaskStore {
    pub fn new(snapshot: Box<dyn SnapshotSink>) -> Self {
        Self {
            tasks: Vec::new(),
            snapshot,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }

    /// Replaces the whole collection.
    #[tracing::instrument(skip(self, initial), fields(count = initial.len()))]
    pub fn load(&mut self, initial: Vec<Task>) {
        info!(previous = self.tasks.len(), "loading task store");
        self.tasks = initial;
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn add(&mut self, mut task: Task) -> Result<(), ValidationError> {
        let trimmed = task.text.trim();
        if trimmed.is_empty() {
            debug!("rejected task with empty text");
            return Err(ValidationError::EmptyText);
        }
        if trimmed.len() != task.text.len() {
            task.text = trimmed.to_string();
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Flips `completed` and returns the new value. Unknown ids are ignored.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle_completed(&mut self, id: &TaskId) -> Option<bool> {
        let Some(task) = self.tasks.iter_mut().find(|task| &task.id == id) else {
            debug!("toggle ignored; no such task");
            return None;
        };
        task.completed = !task.completed;
        Some(task.completed)
    }

    /// Removes and returns the task. Unknown ids are ignored.
    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let Some(idx) = self.tasks.iter().position(|task| &task.id == id) else {
            debug!("remove ignored; no such task");
            return None;
        };
        Some(self.tasks.remove(idx))
    }

    #[tracing::instrument(skip(self), fields(count = self.tasks.len()))]
    pub fn persist_snapshot(&self) -> anyhow::Result<()> {
        self.snapshot.write(&self.tasks)
    }

    /// Loads the last persisted snapshot, if any. Returns whether one existed.
    #[tracing::instrument(skip(self))]
    pub fn restore(&mut self) -> anyhow::Result<bool> {
        match self.snapshot.read()? {
            Some(tasks) => {
                self.load(tasks);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
