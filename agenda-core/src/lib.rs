//! Event scheduling engine for agenda.
//!
//! - `datetime` resolves caller-supplied date/time strings into local instants
//! - `recurrence` expands recurrence rules into concrete occurrences
//! - `reminder` keeps at most one pending reminder timer per event
//! - `store` owns event records and drives the reminder lifecycle on every mutation

pub mod clock;
pub mod datetime;
pub mod error;
pub mod event;
pub mod recurrence;
pub mod reminder;
pub mod store;

pub use clock::{Clock, SystemClock, Timer, TimerHandle, TokioTimer, VirtualClock};
pub use error::{AgendaError, AgendaResult};
pub use event::{Event, EventId, EventPatch, NewEvent};
pub use recurrence::RuleSpec;
pub use reminder::{ReminderDue, ReminderSink, ReminderState, TracingSink};
pub use store::EventStore;
