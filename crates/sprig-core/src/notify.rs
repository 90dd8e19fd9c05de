use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sprig_shared::Tag;
use tracing::{debug, info, warn};

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Unsupported,
    Default,
    Granted,
    Denied,
}

impl NotificationPermission {
    pub fn from_setting(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("default") | Some("ask") => Self::Default,
            Some("on" | "yes" | "true" | "1" | "granted") => Self::Granted,
            Some("off" | "no" | "false" | "0" | "denied") => Self::Denied,
            Some(other) => {
                warn!(value = other, "unknown notifications setting; asking at startup");
                Self::Default
            }
        }
    }
}

/// A reminder that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task_id: TaskId,
    pub text: String,
    pub tag: Tag,
    pub due: DateTime<Utc>,
}

/// Transient user-facing acknowledgment or failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Loaded { count: usize },
    Added { text: String },
    Toggled { text: String, completed: bool },
    Removed { text: String },
    Reminder { text: String, tag: Tag },
    Invalid(String),
    Network(String),
    Storage(String),
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(self, Notice::Invalid(_) | Notice::Network(_) | Notice::Storage(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Loaded { count } => write!(f, "Loaded {count} task(s)"),
            Notice::Added { text } => write!(f, "Added \"{text}\""),
            Notice::Toggled { text, completed: true } => write!(f, "Completed \"{text}\""),
            Notice::Toggled { text, completed: false } => write!(f, "Reopened \"{text}\""),
            Notice::Removed { text } => write!(f, "Deleted \"{text}\""),
            Notice::Reminder { text, tag } => write!(f, "Reminder: {text} [{tag}]"),
            Notice::Invalid(msg) => write!(f, "Invalid task: {msg}"),
            Notice::Network(msg) => write!(f, "Server unavailable: {msg}"),
            Notice::Storage(msg) => write!(f, "Could not save locally: {msg}"),
        }
    }
}

/// Output surface for toasts and system notifications. Reminder timers call
/// into it from their own tasks, hence `Send + Sync`.
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn request_permission(&self) -> NotificationPermission;

    /// Raises a system notification. Returns whether it was shown.
    fn notify(&self, title: &str, body: &str) -> bool;

    fn toast(&self, notice: &Notice);
}

#[derive(Debug, Default)]
struct Recorded {
    permission: Option<NotificationPermission>,
    permission_requests: usize,
    notifications: Vec<(String, String)>,
    toasts: Vec<Notice>,
}

/// Notifier that records everything it is asked to show.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(permission: NotificationPermission) -> Self {
        let notifier = Self::default();
        notifier.inner.lock().permission = Some(permission);
        notifier
    }

    pub fn toasts(&self) -> Vec<Notice> {
        self.inner.lock().toasts.clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.inner.lock().notifications.clone()
    }

    pub fn permission_requests(&self) -> usize {
        self.inner.lock().permission_requests
    }
}

impl Notifier for MemoryNotifier {
    fn permission(&self) -> NotificationPermission {
        self.inner
            .lock()
            .permission
            .unwrap_or(NotificationPermission::Default)
    }

    fn request_permission(&self) -> NotificationPermission {
        let mut inner = self.inner.lock();
        inner.permission_requests += 1;
        let current = inner.permission.unwrap_or(NotificationPermission::Default);
        let updated = match current {
            NotificationPermission::Default => NotificationPermission::Granted,
            other => other,
        };
        inner.permission = Some(updated);
        updated
    }

    fn notify(&self, title: &str, body: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.permission != Some(NotificationPermission::Granted) {
            return false;
        }
        inner.notifications.push((title.to_string(), body.to_string()));
        true
    }

    fn toast(&self, notice: &Notice) {
        self.inner.lock().toasts.push(notice.clone());
    }
}

/// Prints toasts and notifications to the terminal.
#[derive(Debug)]
pub struct TerminalNotifier {
    permission: Mutex<NotificationPermission>,
}

impl TerminalNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
        }
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    fn request_permission(&self) -> NotificationPermission {
        let mut permission = self.permission.lock();
        if *permission == NotificationPermission::Default {
            *permission = if io::stdout().is_terminal() {
                NotificationPermission::Granted
            } else {
                NotificationPermission::Denied
            };
        }
        info!(permission = ?*permission, "notification permission resolved");
        *permission
    }

    fn notify(&self, title: &str, body: &str) -> bool {
        if self.permission() != NotificationPermission::Granted {
            debug!("skipping notification because permission is not granted");
            return false;
        }
        let mut out = io::stdout().lock();
        writeln!(out, "\x07** {title} ** {body}").is_ok()
    }

    fn toast(&self, notice: &Notice) {
        if notice.is_error() {
            let _ = writeln!(io::stderr().lock(), "! {notice}");
        } else {
            let _ = writeln!(io::stdout().lock(), "> {notice}");
        }
    }
}
