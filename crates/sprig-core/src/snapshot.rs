use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::task::Task;

pub const SNAPSHOT_FILE: &str = "todos.json";

/// Durable mirror of the task collection. Every write replaces the whole
/// previous snapshot.
pub trait SnapshotSink: Send {
    fn write(&self, tasks: &[Task]) -> anyhow::Result<()>;

    fn read(&self) -> anyhow::Result<Option<Vec<Task>>>;
}

#[derive(Debug)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(SNAPSHOT_FILE);
        info!(snapshot = %path.display(), "opened local snapshot");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSink for FileSnapshot {
    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    fn write(&self, tasks: &[Task]) -> anyhow::Result<()> {
        debug!(file = %self.path.display(), "saving snapshot atomically");

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut temp, tasks)?;
        temp.flush()?;

        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn read(&self) -> anyhow::Result<Option<Vec<Task>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let tasks: Vec<Task> = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.path.display()))?;
        debug!(count = tasks.len(), "loaded snapshot");
        Ok(Some(tasks))
    }
}

/// In-memory sink holding the serialized snapshot, like a single
/// local-storage key. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    slot: Arc<Mutex<MemorySlot>>,
}

#[derive(Debug, Default)]
struct MemorySlot {
    json: Option<String>,
    writes: usize,
}

impl MemorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> usize {
        self.slot.lock().writes
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().json.clone()
    }
}

impl SnapshotSink for MemorySnapshot {
    fn write(&self, tasks: &[Task]) -> anyhow::Result<()> {
        let json = serde_json::to_string(tasks)?;
        let mut slot = self.slot.lock();
        slot.json = Some(json);
        slot.writes += 1;
        Ok(())
    }

    fn read(&self) -> anyhow::Result<Option<Vec<Task>>> {
        let slot = self.slot.lock();
        slot.json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("failed parsing in-memory snapshot")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    use super::{FileSnapshot, SnapshotSink};
    use crate::task::{Task, TaskId};

    #[test]
    fn file_snapshot_overwrites_instead_of_merging() {
        let temp = tempdir().expect("tempdir");
        let snapshot = FileSnapshot::open(temp.path()).expect("open snapshot");
        assert!(snapshot.read().expect("read empty").is_none());

        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let a = Task::new(TaskId::new("a"), "first", now);
        let b = Task::new(TaskId::new("b"), "second", now);

        snapshot.write(&[a.clone(), b]).expect("write both");
        snapshot.write(&[a.clone()]).expect("write one");

        let loaded = snapshot.read().expect("read").expect("present");
        assert_eq!(loaded, vec![a]);

        let raw = std::fs::read_to_string(snapshot.path()).expect("raw file");
        assert!(raw.contains("\"createdAt\""));
    }
}
