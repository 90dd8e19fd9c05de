use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use sprig_core::error::{GatewayError, SessionError, ValidationError};
use sprig_core::gateway::SyncGateway;
use sprig_core::notify::{MemoryNotifier, Notice};
use sprig_core::render::Renderer;
use sprig_core::session::Session;
use sprig_core::shell::Shell;
use sprig_core::snapshot::{FileSnapshot, MemorySnapshot, SNAPSHOT_FILE};
use sprig_core::task::{Task, TaskDraft, TaskId};
use sprig_core::timer::VirtualClock;
use sprig_core::view::{StatusFilter, ViewQuery};
use sprig_shared::{Priority, Tag};
use tempfile::tempdir;

#[derive(Default)]
struct FakeServer {
    todos: Mutex<Vec<Task>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

#[derive(Clone, Default)]
struct FakeGateway(Arc<FakeServer>);

impl FakeGateway {
    fn seeded(tasks: Vec<Task>) -> Self {
        let gateway = Self::default();
        *gateway.0.todos.lock() = tasks;
        gateway
    }

    fn set_failing(&self, failing: bool) {
        self.0.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.0.calls.load(Ordering::SeqCst)
    }

    fn refuse(&self) -> Result<(), GatewayError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport {
                url: "http://fake/todos".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl SyncGateway for FakeGateway {
    async fn fetch_all(&self) -> Result<Vec<Task>, GatewayError> {
        self.refuse()?;
        Ok(self.0.todos.lock().clone())
    }

    async fn create(&self, draft: &TaskDraft) -> Result<Task, GatewayError> {
        self.refuse()?;
        let mut todos = self.0.todos.lock();
        let mut task = Task::new(
            TaskId::new(format!("srv{}", todos.len() + 1)),
            draft.text.clone(),
            start(),
        );
        task.priority = draft.priority;
        task.tag = draft.tag;
        task.due_date = draft.due_date;
        todos.push(task.clone());
        Ok(task)
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
}

fn task(id: &str, text: &str, due: Option<&str>, completed: bool) -> Task {
    let mut task = Task::new(TaskId::new(id), text, start() - Duration::days(1));
    task.due_date = due.map(|raw| raw.parse().expect("due date"));
    task.completed = completed;
    task
}

struct Harness {
    session: Session<FakeGateway, VirtualClock>,
    server: FakeGateway,
    clock: VirtualClock,
    notifier: MemoryNotifier,
    snapshot: MemorySnapshot,
}

fn harness(seed: Vec<Task>) -> Harness {
    let server = FakeGateway::seeded(seed);
    let clock = VirtualClock::new(start());
    let notifier = MemoryNotifier::new();
    let snapshot = MemorySnapshot::new();
    let session = Session::new(
        server.clone(),
        clock.clone(),
        Box::new(snapshot.clone()),
        Arc::new(notifier.clone()),
        chrono_tz::UTC,
    );
    Harness {
        session,
        server,
        clock,
        notifier,
        snapshot,
    }
}

fn mixed_seed() -> Vec<Task> {
    vec![
        task("future", "Dentist", Some("2026-10-20T10:00"), false),
        task("past", "Renew passport", Some("2026-10-18"), false),
        task("done", "File taxes", Some("2026-10-21"), true),
        task("undated", "Read book", None, false),
    ]
}

#[tokio::test]
async fn boot_hydrates_and_schedules_only_future_incomplete_tasks() {
    let mut h = harness(mixed_seed());

    assert_eq!(h.session.boot().await.expect("boot"), 4);
    assert_eq!(h.session.tasks().len(), 4);
    assert_eq!(h.session.pending_reminders(), vec![TaskId::new("future")]);
    assert_eq!(h.clock.pending_count(), 1);
    assert_eq!(h.notifier.permission_requests(), 1);
    assert_eq!(h.notifier.toasts(), vec![Notice::Loaded { count: 4 }]);
    assert_eq!(h.snapshot.writes(), 1);
}

#[tokio::test]
async fn failed_boot_leaves_an_empty_list_and_reports() {
    let mut h = harness(mixed_seed());
    h.server.set_failing(true);

    let err = h.session.boot().await.expect_err("boot should fail");
    assert!(matches!(err, SessionError::Network(GatewayError::Transport { .. })));
    assert!(h.session.tasks().is_empty());
    assert!(h.session.pending_reminders().is_empty());
    assert_eq!(h.snapshot.writes(), 0);
    assert!(matches!(h.notifier.toasts().as_slice(), [Notice::Network(_)]));
}

#[tokio::test]
async fn blank_text_is_rejected_before_any_request() {
    let mut h = harness(vec![]);
    h.session.boot().await.expect("boot");
    let calls_after_boot = h.server.calls();

    for text in ["", "   ", "\t\n"] {
        let err = h
            .session
            .add(TaskDraft::new(text))
            .await
            .expect_err("blank text");
        assert_eq!(err, SessionError::Validation(ValidationError::EmptyText));
    }

    assert_eq!(h.server.calls(), calls_after_boot);
    assert!(h.session.tasks().is_empty());
    assert_eq!(h.snapshot.writes(), 1);
    assert!(
        h.notifier
            .toasts()
            .iter()
            .skip(1)
            .all(|notice| matches!(notice, Notice::Invalid(_)))
    );
}

#[tokio::test]
async fn failed_create_changes_nothing_locally() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");
    let before = h.session.tasks().to_vec();
    h.server.set_failing(true);

    let err = h
        .session
        .add(TaskDraft::new("Call plumber").with_due("2026-10-19T12:00".parse().expect("due")))
        .await
        .expect_err("create should fail");

    assert!(matches!(err, SessionError::Network(_)));
    assert_eq!(h.session.tasks(), before.as_slice());
    assert_eq!(h.session.pending_reminders(), vec![TaskId::new("future")]);
    assert_eq!(h.snapshot.writes(), 1);
    assert!(matches!(h.notifier.toasts().last(), Some(Notice::Network(_))));
}

#[tokio::test]
async fn added_task_uses_server_identity_and_trimmed_text() {
    let mut h = harness(vec![]);
    h.session.boot().await.expect("boot");

    let id = h
        .session
        .add(
            TaskDraft::new("  Buy milk  ")
                .with_priority(Priority::High)
                .with_tag(Tag::Shopping),
        )
        .await
        .expect("add");

    assert_eq!(id, TaskId::new("srv1"));
    let added = h.session.get(&id).expect("stored");
    assert_eq!(added.text, "Buy milk");
    assert_eq!(added.priority, Priority::High);
    assert_eq!(added.tag, Tag::Shopping);
    assert!(!added.completed);
    assert_eq!(
        h.notifier.toasts().last(),
        Some(&Notice::Added {
            text: "Buy milk".to_string()
        })
    );
}

#[tokio::test]
async fn reminder_fires_once_at_the_due_instant() {
    let mut h = harness(vec![]);
    h.session.boot().await.expect("boot");

    let id = h
        .session
        .add(
            TaskDraft::new("Pay rent")
                .with_tag(Tag::Personal)
                .with_due("2026-10-19T09:00".parse().expect("due")),
        )
        .await
        .expect("add");
    assert!(h.session.reminders().has_pending(&id));

    assert_eq!(h.clock.advance_by(Duration::minutes(59)), 0);
    assert_eq!(h.clock.advance_by(Duration::minutes(1)), 1);
    assert_eq!(
        h.notifier.notifications(),
        vec![("Task due".to_string(), "Pay rent [Personal]".to_string())]
    );
    assert_eq!(
        h.notifier.toasts().last(),
        Some(&Notice::Reminder {
            text: "Pay rent".to_string(),
            tag: Tag::Personal,
        })
    );
    assert!(h.session.pending_reminders().is_empty());
    assert_eq!(h.clock.advance_by(Duration::days(2)), 0);
    assert_eq!(h.notifier.notifications().len(), 1);
}

#[tokio::test]
async fn completing_or_deleting_cancels_the_reminder() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");
    let future = TaskId::new("future");

    assert_eq!(h.session.toggle(&future), Some(true));
    assert!(h.session.pending_reminders().is_empty());
    assert_eq!(h.clock.pending_count(), 0);

    assert_eq!(h.session.toggle(&future), Some(false));
    assert_eq!(h.session.pending_reminders(), vec![future.clone()]);
    assert!(!h.session.get(&future).expect("task").completed);

    assert!(h.session.remove(&future));
    assert!(h.session.get(&future).is_none());
    assert!(h.session.pending_reminders().is_empty());
    assert_eq!(h.clock.pending_count(), 0);

    assert_eq!(h.clock.advance_by(Duration::days(3)), 0);
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn unknown_ids_are_silent_no_ops() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");
    let toasts = h.notifier.toasts().len();
    let writes = h.snapshot.writes();

    let ghost = TaskId::new("ghost");
    assert_eq!(h.session.toggle(&ghost), None);
    assert!(!h.session.remove(&ghost));

    assert_eq!(h.session.tasks().len(), 4);
    assert_eq!(h.notifier.toasts().len(), toasts);
    assert_eq!(h.snapshot.writes(), writes);
}

#[tokio::test]
async fn snapshot_is_rewritten_after_every_mutation() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");
    let id = h.session.add(TaskDraft::new("Water plants")).await.expect("add");
    h.session.toggle(&id);
    h.session.remove(&TaskId::new("past"));
    assert_eq!(h.snapshot.writes(), 4);

    let saved: Vec<Task> =
        serde_json::from_str(&h.snapshot.raw().expect("snapshot written")).expect("json");
    assert_eq!(saved.as_slice(), h.session.tasks());

    let notifier = MemoryNotifier::new();
    let mut offline = Session::new(
        FakeGateway::default(),
        VirtualClock::new(start()),
        Box::new(h.snapshot.clone()),
        Arc::new(notifier),
        chrono_tz::UTC,
    );
    assert!(offline.restore_snapshot().expect("restore"));
    assert_eq!(offline.tasks(), h.session.tasks());
    assert!(offline.pending_reminders().is_empty());
}

#[tokio::test]
async fn views_follow_store_state() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");

    let active: Vec<&str> = h
        .session
        .view(&ViewQuery::status(StatusFilter::Active))
        .iter()
        .map(|task| task.id.as_str())
        .collect();
    assert_eq!(active.len(), 3);
    assert!(!active.contains(&"done"));

    h.session.toggle(&TaskId::new("undated"));
    let completed = h.session.view(&ViewQuery::status(StatusFilter::Completed));
    assert_eq!(completed.len(), 2);
}

#[tokio::test]
async fn shutdown_and_drop_leave_no_timers() {
    let mut h = harness(mixed_seed());
    h.session.boot().await.expect("boot");
    assert_eq!(h.clock.pending_count(), 1);

    h.session.shutdown();
    assert_eq!(h.clock.pending_count(), 0);

    h.session.boot().await.expect("second boot");
    assert_eq!(h.notifier.permission_requests(), 1);
    assert_eq!(h.clock.pending_count(), 1);

    let clock = h.clock.clone();
    drop(h);
    assert_eq!(clock.pending_count(), 0);
}

#[tokio::test]
async fn file_snapshot_survives_a_new_session() {
    let temp = tempdir().expect("tempdir");
    let server = FakeGateway::seeded(mixed_seed());

    let mut first = Session::new(
        server.clone(),
        VirtualClock::new(start()),
        Box::new(FileSnapshot::open(temp.path()).expect("open")),
        Arc::new(MemoryNotifier::new()),
        chrono_tz::UTC,
    );
    first.boot().await.expect("boot");
    first.toggle(&TaskId::new("undated"));
    assert!(temp.path().join(SNAPSHOT_FILE).exists());

    let mut second = Session::new(
        server,
        VirtualClock::new(start()),
        Box::new(FileSnapshot::open(temp.path()).expect("reopen")),
        Arc::new(MemoryNotifier::new()),
        chrono_tz::UTC,
    );
    assert!(second.restore_snapshot().expect("restore"));
    assert_eq!(second.tasks(), first.tasks());
    assert!(second.get(&TaskId::new("undated")).expect("task").completed);
}

#[tokio::test]
async fn shell_script_drives_the_session() {
    let mut h = harness(vec![]);
    let mut shell = Shell::new(Renderer::plain(chrono_tz::UTC), ViewQuery::default());
    let script: &[u8] = b"add Call mom tag:personal due:2026-10-19T20:00\n\
        bogus\n\
        ls active\n\
        done 1\n\
        ls\n\
        quit\n\
        add never reached\n";
    let mut out = Vec::new();

    shell
        .run(&mut h.session, script, &mut out)
        .await
        .expect("shell run");

    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("No tasks."));
    assert!(text.contains("Call mom"));
    assert!(text.contains("unknown command 'bogus'"));

    assert_eq!(h.session.tasks().len(), 1);
    let task = &h.session.tasks()[0];
    assert!(task.completed);
    assert_eq!(task.tag, Tag::Personal);
    assert_eq!(h.clock.pending_count(), 0);
}

#[tokio::test]
async fn shell_reports_rows_that_no_longer_exist() {
    let mut h = harness(vec![
        task("aaa", "First", None, false),
        task("bbb", "Second", None, false),
    ]);
    let mut shell = Shell::new(Renderer::plain(chrono_tz::UTC), ViewQuery::default());
    let script: &[u8] = b"rm 1\nrm 1\ndone 1\nquit\n";
    let mut out = Vec::new();

    shell
        .run(&mut h.session, script, &mut out)
        .await
        .expect("shell run");

    let text = String::from_utf8(out).expect("utf8");
    assert_eq!(text.matches("! no task matches '1'").count(), 2);

    assert_eq!(h.session.tasks().len(), 1);
    assert!(!h.session.tasks()[0].completed);
}
