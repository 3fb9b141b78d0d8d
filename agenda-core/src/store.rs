//! In-memory event store.
//!
//! Records and reminder timers sit behind a single mutex, and every mutation holds it
//! across the whole record change plus disarm/arm sequence. Timer callbacks take the
//! same lock, so they never interleave with a create, update or delete.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Local};
use tracing::info;

use crate::clock::{Clock, Timer};
use crate::datetime;
use crate::error::{AgendaError, AgendaResult};
use crate::event::{non_null, Event, EventId, EventPatch, NewEvent};
use crate::recurrence::RuleSpec;
use crate::reminder::{ElapseFn, ReminderScheduler, ReminderSink, ReminderState, TimerToken};

/// Shared handle to the event store. Clones refer to the same store.
#[derive(Clone)]
pub struct EventStore {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<StoreState>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ReminderSink>,
}

struct StoreState {
    records: HashMap<EventId, StoredEvent>,
    next_seq: u64,
    scheduler: ReminderScheduler,
}

struct StoredEvent {
    /// Insertion order, used to break ties between events at the same instant.
    seq: u64,
    event: Event,
}

impl EventStore {
    pub fn new(clock: Arc<dyn Clock>, timer: Arc<dyn Timer>, sink: Arc<dyn ReminderSink>) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let on_elapse: ElapseFn = Arc::new(move |id, token| {
                if let Some(shared) = weak.upgrade() {
                    shared.reminder_elapsed(&id, token);
                }
            });

            Shared {
                state: Mutex::new(StoreState {
                    records: HashMap::new(),
                    next_seq: 0,
                    scheduler: ReminderScheduler::new(timer, on_elapse),
                }),
                clock,
                sink,
            }
        });

        EventStore { shared }
    }

    /// Validate, resolve and store a new event, arming its reminder if it has one.
    pub fn create(&self, fields: NewEvent) -> AgendaResult<Event> {
        require_non_empty(&[
            ("title", &fields.title),
            ("date", &fields.date),
            ("time", &fields.time),
        ])
        .map_err(|_| AgendaError::Validation("title, date and time are required".into()))?;

        let date_time = datetime::resolve(&fields.date, &fields.time)?;
        validate_rule(fields.repeat_rule.as_ref(), date_time)?;

        let event = Event {
            id: EventId::generate(),
            title: fields.title,
            date: fields.date,
            time: fields.time,
            date_time,
            description: fields.description.unwrap_or_default(),
            duration: fields.duration.unwrap_or_default(),
            repeat_rule: fields.repeat_rule,
            reminder_minutes: non_null(fields.reminder_minutes),
        };

        let now = self.shared.clock.now();
        let mut state = self.shared.lock();

        state.scheduler.arm(&event, now);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.records.insert(
            event.id.clone(),
            StoredEvent {
                seq,
                event: event.clone(),
            },
        );

        info!(event_id = %event.id, date_time = %event.date_time, "Event created");
        Ok(event)
    }

    /// All events, ascending by instant; events at the same instant keep insertion order.
    pub fn list(&self) -> Vec<Event> {
        let state = self.shared.lock();

        let mut stored: Vec<&StoredEvent> = state.records.values().collect();
        stored.sort_by_key(|s| (s.event.date_time, s.seq));
        stored.into_iter().map(|s| s.event.clone()).collect()
    }

    pub fn get(&self, id: &EventId) -> AgendaResult<Event> {
        self.shared
            .lock()
            .records
            .get(id)
            .map(|s| s.event.clone())
            .ok_or_else(|| AgendaError::NotFound(id.clone()))
    }

    /// Apply a partial update and re-arm the reminder.
    ///
    /// Nothing changes if the patch is rejected.
    pub fn update(&self, id: &EventId, patch: EventPatch) -> AgendaResult<Event> {
        let now = self.shared.clock.now();
        let mut state = self.shared.lock();

        let existing = state
            .records
            .get(id)
            .map(|s| &s.event)
            .ok_or_else(|| AgendaError::NotFound(id.clone()))?;

        let updated = apply_patch(existing, patch)?;
        state.scheduler.rearm(&updated, now);

        if let Some(stored) = state.records.get_mut(id) {
            stored.event = updated.clone();
        }

        info!(event_id = %id, date_time = %updated.date_time, "Event updated");
        Ok(updated)
    }

    /// Remove an event and cancel its pending reminder.
    pub fn delete(&self, id: &EventId) -> AgendaResult<EventId> {
        let mut state = self.shared.lock();

        if state.records.remove(id).is_none() {
            return Err(AgendaError::NotFound(id.clone()));
        }
        state.scheduler.disarm(id);

        info!(event_id = %id, "Event deleted");
        Ok(id.clone())
    }

    /// Reminder state of an existing event.
    pub fn reminder_state(&self, id: &EventId) -> AgendaResult<ReminderState> {
        let state = self.shared.lock();
        if !state.records.contains_key(id) {
            return Err(AgendaError::NotFound(id.clone()));
        }
        Ok(state.scheduler.state(id))
    }

    /// Total number of pending reminders.
    pub fn pending_reminders(&self) -> usize {
        self.shared.lock().scheduler.pending_count()
    }

    /// The store's notion of the current instant.
    pub fn now(&self) -> DateTime<Local> {
        self.shared.clock.now()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reminder_elapsed(&self, id: &EventId, token: TimerToken) {
        let due = self.lock().scheduler.fire(id, token);
        if let Some(due) = due {
            self.sink.reminder_due(&due);
        }
    }
}

fn apply_patch(existing: &Event, patch: EventPatch) -> AgendaResult<Event> {
    let supplied: Vec<(&str, &String)> = [
        ("title", patch.title.as_ref()),
        ("date", patch.date.as_ref()),
        ("time", patch.time.as_ref()),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.map(|v| (name, v)))
    .collect();
    require_non_empty(&supplied)?;

    let reschedule = patch.touches_schedule();
    let mut updated = existing.clone();

    if let Some(title) = patch.title {
        updated.title = title;
    }
    if let Some(date) = patch.date {
        updated.date = date;
    }
    if let Some(time) = patch.time {
        updated.time = time;
    }
    if let Some(description) = patch.description {
        updated.description = description;
    }
    if let Some(duration) = patch.duration {
        updated.duration = duration;
    }
    if let Some(minutes) = patch.reminder_minutes {
        updated.reminder_minutes = non_null(Some(minutes));
    }

    if reschedule {
        updated.date_time = datetime::resolve(&updated.date, &updated.time)?;
    }

    match patch.repeat_rule {
        Some(rule) => {
            validate_rule(rule.as_ref(), updated.date_time)?;
            updated.repeat_rule = rule;
        }
        None if reschedule => validate_rule(updated.repeat_rule.as_ref(), updated.date_time)?,
        None => {}
    }

    Ok(updated)
}

fn require_non_empty(fields: &[(&str, &String)]) -> AgendaResult<()> {
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(AgendaError::Validation(format!("{} must not be empty", name))),
        None => Ok(()),
    }
}

fn validate_rule(rule: Option<&RuleSpec>, anchor: DateTime<Local>) -> AgendaResult<()> {
    match rule {
        Some(rule) => rule.validate(anchor),
        None => Ok(()),
    }
}
