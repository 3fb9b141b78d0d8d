//! Event records and the field sets used to create and update them.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::recurrence::RuleSpec;
use crate::reminder;

/// Opaque event identifier. Assigned once at creation and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn generate() -> Self {
        EventId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        EventId(value)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        EventId(value.to_string())
    }
}

/// A stored calendar event.
///
/// `date` and `time` are kept exactly as the caller sent them; `date_time` is derived
/// from them and recomputed whenever either changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub date: String,
    pub time: String,
    pub date_time: DateTime<Local>,
    pub description: String,
    pub duration: String,
    pub repeat_rule: Option<RuleSpec>,
    /// Minutes before `date_time` to remind, verbatim as supplied.
    pub reminder_minutes: Option<Value>,
}

impl Event {
    /// The reminder offset, if `reminder_minutes` holds a usable number.
    pub fn reminder_offset(&self) -> Option<f64> {
        reminder::offset_minutes(self.reminder_minutes.as_ref())
    }
}

/// Fields for a new event. `title`, `date` and `time` must be non-empty.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    pub date: String,
    pub time: String,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub repeat_rule: Option<RuleSpec>,
    pub reminder_minutes: Option<Value>,
}

/// A partial update. `None` keeps the stored value.
///
/// `repeat_rule: Some(None)` and `reminder_minutes: Some(Value::Null)` clear the field.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub repeat_rule: Option<Option<RuleSpec>>,
    pub reminder_minutes: Option<Value>,
}

impl EventPatch {
    pub fn touches_schedule(&self) -> bool {
        self.date.is_some() || self.time.is_some()
    }
}

/// Drop JSON `null` so "no reminder" has a single representation.
pub(crate) fn non_null(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
