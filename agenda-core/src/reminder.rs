//! Reminder timers.
//!
//! `ReminderScheduler` keeps at most one pending timer per event. Arming always cancels
//! whatever was pending for that id first, and an elapsed timer only counts if its token
//! still matches the pending entry, so a timer that loses a race with its own
//! cancellation does nothing.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta};
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::{Timer, TimerHandle};
use crate::event::{Event, EventId};

/// Identity of one armed timer. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Reminder state of one event.
///
/// A fired reminder drops straight back to `NoReminder`; there is no lasting
/// "fired" state.
#[derive(Debug, Clone, PartialEq)]
pub enum ReminderState {
    NoReminder,
    Pending {
        fire_at: DateTime<Local>,
        token: TimerToken,
    },
}

/// Emitted when a reminder comes due.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDue {
    pub id: EventId,
    pub title: String,
    pub date: String,
    pub time: String,
    pub fire_at: DateTime<Local>,
}

/// Receives due reminders. Delivery (console, push, email) is up to the implementor.
pub trait ReminderSink: Send + Sync {
    fn reminder_due(&self, due: &ReminderDue);
}

/// Logs due reminders through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReminderSink for TracingSink {
    fn reminder_due(&self, due: &ReminderDue) {
        info!(
            event_id = %due.id,
            fire_at = %due.fire_at,
            "Reminder for event {}: {} at {} {}",
            due.id,
            due.title,
            due.date,
            due.time
        );
    }
}

/// Called with the event id and token when an armed timer elapses.
pub type ElapseFn = Arc<dyn Fn(EventId, TimerToken) + Send + Sync>;

struct PendingReminder {
    token: TimerToken,
    handle: Box<dyn TimerHandle>,
    due: ReminderDue,
}

pub struct ReminderScheduler {
    timer: Arc<dyn Timer>,
    on_elapse: ElapseFn,
    pending: HashMap<EventId, PendingReminder>,
    next_token: u64,
}

impl ReminderScheduler {
    pub fn new(timer: Arc<dyn Timer>, on_elapse: ElapseFn) -> Self {
        ReminderScheduler {
            timer,
            on_elapse,
            pending: HashMap::new(),
            next_token: 0,
        }
    }

    /// Arm a reminder for `event` relative to `now`.
    ///
    /// A missing or unusable offset, or a fire time that is not in the future, leaves the
    /// event with no reminder. Any previously pending timer for the id is cancelled first.
    pub fn arm(&mut self, event: &Event, now: DateTime<Local>) -> ReminderState {
        self.disarm(&event.id);

        let Some(offset) = event.reminder_offset() else {
            if event.reminder_minutes.is_some() {
                debug!(
                    event_id = %event.id,
                    value = ?event.reminder_minutes,
                    "Reminder offset is not a usable number; not scheduled"
                );
            }
            return ReminderState::NoReminder;
        };

        let Some(fire_at) = fire_time(event.date_time, offset, now) else {
            info!(event_id = %event.id, "Reminder time already passed; not scheduled");
            return ReminderState::NoReminder;
        };

        let Ok(delay) = (fire_at - now).to_std() else {
            return ReminderState::NoReminder;
        };

        let token = TimerToken(self.next_token);
        self.next_token += 1;

        let on_elapse = Arc::clone(&self.on_elapse);
        let elapsed_id = event.id.clone();
        let handle = self
            .timer
            .schedule(delay, Box::new(move || on_elapse(elapsed_id, token)));

        debug!(event_id = %event.id, %fire_at, delay_ms = delay.as_millis() as u64, "Reminder armed");

        self.pending.insert(
            event.id.clone(),
            PendingReminder {
                token,
                handle,
                due: ReminderDue {
                    id: event.id.clone(),
                    title: event.title.clone(),
                    date: event.date.clone(),
                    time: event.time.clone(),
                    fire_at,
                },
            },
        );

        ReminderState::Pending { fire_at, token }
    }

    /// Cancel the pending timer for `id`, if any.
    pub fn disarm(&mut self, id: &EventId) {
        if let Some(pending) = self.pending.remove(id) {
            pending.handle.cancel();
            debug!(event_id = %id, "Reminder cancelled");
        }
    }

    /// Replace whatever is pending for the event with a freshly computed reminder.
    pub fn rearm(&mut self, event: &Event, now: DateTime<Local>) -> ReminderState {
        self.arm(event, now)
    }

    /// Handle an elapsed timer. Returns the notification to deliver, or `None` when the
    /// token no longer matches the pending reminder for `id`.
    pub fn fire(&mut self, id: &EventId, token: TimerToken) -> Option<ReminderDue> {
        let current = self.pending.get(id).is_some_and(|p| p.token == token);
        if !current {
            debug!(event_id = %id, "Ignoring stale reminder timer");
            return None;
        }

        self.pending.remove(id).map(|pending| pending.due)
    }

    pub fn state(&self, id: &EventId) -> ReminderState {
        match self.pending.get(id) {
            Some(pending) => ReminderState::Pending {
                fire_at: pending.due.fire_at,
                token: pending.token,
            },
            None => ReminderState::NoReminder,
        }
    }

    /// Number of pending reminders across all events.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Parse a reminder offset in minutes: a non-negative finite JSON number or numeric
/// string.
pub fn offset_minutes(value: Option<&Value>) -> Option<f64> {
    let minutes = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    (minutes.is_finite() && minutes >= 0.0).then_some(minutes)
}

/// `event_instant - offset`, or `None` when that is not after `now`.
pub fn fire_time(
    event_instant: DateTime<Local>,
    offset_minutes: f64,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let offset_ms = (offset_minutes * 60_000.0).round();
    if offset_ms > i64::MAX as f64 {
        return None;
    }

    let fire_at = event_instant.checked_sub_signed(TimeDelta::try_milliseconds(offset_ms as i64)?)?;
    (fire_at > now).then_some(fire_at)
}
