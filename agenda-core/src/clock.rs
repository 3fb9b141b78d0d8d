//! Time sources and cancellable timers.
//!
//! The scheduler only talks to `Clock` and `Timer`, so the wall clock plus tokio can be
//! swapped for `VirtualClock` in tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Work to run once a timer elapses.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Something that can run a task after a delay.
pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

/// A scheduled task that has not run yet.
pub trait TimerHandle: Send {
    /// Prevent the task from running. Has no effect once it has run.
    fn cancel(self: Box<Self>);
}

/// The host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Timer backed by sleeping tokio tasks.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    runtime: Handle,
}

impl TokioTimer {
    pub fn new(runtime: Handle) -> Self {
        TokioTimer { runtime }
    }
}

struct TokioTimerHandle(JoinHandle<()>);

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimerHandle(join))
    }
}

impl TimerHandle for TokioTimerHandle {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}

/// Manually driven clock and timer for tests.
///
/// Time only moves when `advance` is called. Due tasks run on the caller's thread,
/// after the internal lock is released, so they may schedule further timers.
#[derive(Clone)]
pub struct VirtualClock {
    state: Arc<Mutex<VirtualState>>,
}

struct VirtualState {
    now: DateTime<Local>,
    next_slot: u64,
    entries: BTreeMap<u64, VirtualEntry>,
}

struct VirtualEntry {
    due: DateTime<Local>,
    cancelled: bool,
    task: TimerTask,
}

struct VirtualTimerHandle {
    state: Arc<Mutex<VirtualState>>,
    slot: u64,
}

impl VirtualClock {
    pub fn new(now: DateTime<Local>) -> Self {
        VirtualClock {
            state: Arc::new(Mutex::new(VirtualState {
                now,
                next_slot: 0,
                entries: BTreeMap::new(),
            })),
        }
    }

    /// Move time forward and run every live task that has come due, earliest first.
    pub fn advance(&self, by: TimeDelta) {
        let due = {
            let mut state = lock(&self.state);
            state.now += by;
            let now = state.now;

            let slots: Vec<u64> = state
                .entries
                .iter()
                .filter(|(_, e)| !e.cancelled && e.due <= now)
                .map(|(slot, _)| *slot)
                .collect();

            let mut due: Vec<VirtualEntry> = slots
                .into_iter()
                .filter_map(|slot| state.entries.remove(&slot))
                .collect();
            due.sort_by_key(|e| e.due);
            due
        };

        for entry in due {
            (entry.task)();
        }
    }

    /// Run every remaining task immediately, including cancelled ones.
    ///
    /// Simulates a timer that fires while its cancellation is in flight.
    pub fn force_fire_all(&self) {
        let entries = std::mem::take(&mut lock(&self.state).entries);
        for (_, entry) in entries {
            (entry.task)();
        }
    }

    /// Number of scheduled tasks that are neither cancelled nor run.
    pub fn live_timers(&self) -> usize {
        lock(&self.state)
            .entries
            .values()
            .filter(|e| !e.cancelled)
            .count()
    }

    /// Due instants of the live tasks, in scheduling order.
    pub fn live_due_times(&self) -> Vec<DateTime<Local>> {
        lock(&self.state)
            .entries
            .values()
            .filter(|e| !e.cancelled)
            .map(|e| e.due)
            .collect()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Local> {
        lock(&self.state).now
    }
}

impl Timer for VirtualClock {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let mut state = lock(&self.state);
        let slot = state.next_slot;
        state.next_slot += 1;

        let delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
        let due = state.now.checked_add_signed(delay).unwrap_or(state.now);
        state.entries.insert(
            slot,
            VirtualEntry {
                due,
                cancelled: false,
                task,
            },
        );

        Box::new(VirtualTimerHandle {
            state: Arc::clone(&self.state),
            slot,
        })
    }
}

impl TimerHandle for VirtualTimerHandle {
    fn cancel(self: Box<Self>) {
        if let Some(entry) = lock(&self.state).entries.get_mut(&self.slot) {
            entry.cancelled = true;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_virtual_clock_runs_due_tasks_only() {
        let clock = VirtualClock::new(Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        let fired = Arc::new(AtomicUsize::new(0));

        clock.schedule(Duration::from_secs(60), counter_task(&fired));
        clock.schedule(Duration::from_secs(600), counter_task(&fired));

        clock.advance(TimeDelta::seconds(59));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.live_timers(), 1);
    }

    #[test]
    fn test_virtual_clock_cancel() {
        let clock = VirtualClock::new(Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = clock.schedule(Duration::from_secs(5), counter_task(&fired));
        handle.cancel();
        clock.advance(TimeDelta::minutes(1));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.live_timers(), 0);

        clock.force_fire_all();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_fires_and_cancels() {
        let timer = TokioTimer::new(Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));

        timer.schedule(Duration::from_secs(30), counter_task(&fired));
        let cancelled = timer.schedule(Duration::from_secs(30), counter_task(&fired));
        cancelled.cancel();

        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
