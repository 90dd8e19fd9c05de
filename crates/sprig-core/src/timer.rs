use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// One-shot timers addressed by token.
pub trait TimerBackend {
    fn now(&self) -> DateTime<Utc>;

    fn schedule_at(&mut self, at: DateTime<Utc>, callback: TimerCallback) -> TimerToken;

    /// Cancelling an unknown or already-fired token does nothing.
    fn cancel(&mut self, token: TimerToken);

    fn is_pending(&self, token: TimerToken) -> bool;
}

struct VirtualTimer {
    token: TimerToken,
    at: DateTime<Utc>,
    callback: TimerCallback,
}

struct VirtualState {
    now: DateTime<Utc>,
    next_token: u64,
    timers: Vec<VirtualTimer>,
}

/// Deterministic clock for tests. Time only moves through `advance_to`;
/// clones share the same timeline.
#[derive(Clone)]
pub struct VirtualClock {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                now: start,
                next_token: 0,
                timers: Vec::new(),
            })),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Moves time forward, running due callbacks in due order. Returns how
    /// many fired.
    pub fn advance_to(&self, target: DateTime<Utc>) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due_idx = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.at <= target)
                    .min_by_key(|(_, timer)| (timer.at, timer.token))
                    .map(|(idx, _)| idx);
                match due_idx {
                    Some(idx) => {
                        let timer = state.timers.remove(idx);
                        if timer.at > state.now {
                            state.now = timer.at;
                        }
                        Some(timer)
                    }
                    None => {
                        if target > state.now {
                            state.now = target;
                        }
                        None
                    }
                }
            };

            let Some(timer) = next else {
                return fired;
            };
            trace!(token = ?timer.token, at = %timer.at, "virtual timer fired");
            (timer.callback)();
            fired += 1;
        }
    }

    pub fn advance_by(&self, step: Duration) -> usize {
        let target = self.state.lock().now + step;
        self.advance_to(target)
    }
}

impl TimerBackend for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    fn schedule_at(&mut self, at: DateTime<Utc>, callback: TimerCallback) -> TimerToken {
        let mut state = self.state.lock();
        let token = TimerToken(state.next_token);
        state.next_token += 1;
        state.timers.push(VirtualTimer {
            token,
            at,
            callback,
        });
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        self.state.lock().timers.retain(|timer| timer.token != token);
    }

    fn is_pending(&self, token: TimerToken) -> bool {
        self.state.lock().timers.iter().any(|timer| timer.token == token)
    }
}

/// Wall-clock timers: one sleeping tokio task per timer, cancelled by abort.
pub struct TokioTimers {
    runtime: Handle,
    next_token: u64,
    handles: HashMap<TimerToken, JoinHandle<()>>,
}

impl TokioTimers {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = Handle::try_current().context("reminder timers need a tokio runtime")?;
        Ok(Self {
            runtime,
            next_token: 0,
            handles: HashMap::new(),
        })
    }
}

impl TimerBackend for TokioTimers {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule_at(&mut self, at: DateTime<Utc>, callback: TimerCallback) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;

        let delay = (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        self.handles.retain(|_, handle| !handle.is_finished());
        self.handles.insert(token, handle);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.handles.remove(&token) {
            handle.abort();
        }
    }

    fn is_pending(&self, token: TimerToken) -> bool {
        self.handles
            .get(&token)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;

    use super::{TimerBackend, TokioTimers, VirtualClock};

    #[test]
    fn virtual_clock_fires_in_due_order_and_skips_cancelled() {
        let start = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let mut clock = VirtualClock::new(start);
        let log = Arc::new(Mutex::new(Vec::new()));

        for (label, minutes) in [("late", 30), ("early", 10), ("dropped", 20)] {
            let log = Arc::clone(&log);
            let token = clock.schedule_at(
                start + Duration::minutes(minutes),
                Box::new(move || log.lock().push(label)),
            );
            if label == "dropped" {
                clock.cancel(token);
                assert!(!clock.is_pending(token));
            }
        }

        assert_eq!(clock.advance_by(Duration::minutes(15)), 1);
        assert_eq!(clock.now(), start + Duration::minutes(15));
        assert_eq!(clock.advance_by(Duration::hours(1)), 1);
        assert_eq!(*log.lock(), vec!["early", "late"]);
        assert_eq!(clock.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timers_fire_after_delay_and_abort_on_cancel() {
        let mut timers = TokioTimers::new().expect("inside runtime");
        let log = Arc::new(Mutex::new(Vec::new()));

        let keep = {
            let log = Arc::clone(&log);
            timers.schedule_at(
                Utc::now() + Duration::milliseconds(50),
                Box::new(move || log.lock().push("kept")),
            )
        };
        let dropped = {
            let log = Arc::clone(&log);
            timers.schedule_at(
                Utc::now() + Duration::milliseconds(50),
                Box::new(move || log.lock().push("cancelled")),
            )
        };
        timers.cancel(dropped);
        assert!(timers.is_pending(keep));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert_eq!(*log.lock(), vec!["kept"]);
        assert!(!timers.is_pending(keep));
    }

    #[test]
    fn tokio_timers_require_a_runtime() {
        assert!(TokioTimers::new().is_err());
    }
}
