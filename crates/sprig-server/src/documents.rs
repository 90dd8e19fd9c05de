use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use sprig_shared::TodoDto;
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub const DOCUMENTS_FILE: &str = "todos.data";

/// Persistent collection of todo records. Handlers call it from many worker
/// threads at once.
pub trait DocumentStore: Send + Sync {
    fn list(&self) -> anyhow::Result<Vec<TodoDto>>;

    fn insert(&self, todo: &TodoDto) -> anyhow::Result<()>;
}

/// One JSON record per line, rewritten through a temp file on every insert.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join(DOCUMENTS_FILE);
        if !path.exists() {
            fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
        }

        info!(file = %path.display(), "opened document store");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for JsonFileStore {
    fn list(&self) -> anyhow::Result<Vec<TodoDto>> {
        let _guard = self.lock.lock();
        load_jsonl(&self.path)
    }

    #[tracing::instrument(skip(self, todo), fields(id = %todo.id))]
    fn insert(&self, todo: &TodoDto) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut todos = load_jsonl(&self.path)?;
        todos.push(todo.clone());
        save_jsonl_atomic(&self.path, &todos)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    todos: Mutex<Vec<TodoDto>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn list(&self) -> anyhow::Result<Vec<TodoDto>> {
        Ok(self.todos.lock().clone())
    }

    fn insert(&self, todo: &TodoDto) -> anyhow::Result<()> {
        self.todos.lock().push(todo.clone());
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<TodoDto>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let todo: TodoDto = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(todo);
    }

    debug!(count = out.len(), "loaded todos from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, todos))]
fn save_jsonl_atomic(path: &Path, todos: &[TodoDto]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = todos.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for todo in todos {
        let serialized = serde_json::to_string(todo)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
