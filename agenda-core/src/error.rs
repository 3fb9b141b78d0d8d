//! Error types for the agenda scheduling engine.

use thiserror::Error;

use crate::event::EventId;

/// Errors that can occur in agenda operations.
///
/// All of these are recoverable and reported to the caller. The reminder path
/// never produces one of these for an unschedulable reminder; it degrades to
/// "not scheduled" instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgendaError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unable to parse date/time from date '{date}' and time '{time}'")]
    Parse { date: String, time: String },

    #[error("Invalid recurrence rule: {0}")]
    Rule(String),

    #[error("Event not found: {0}")]
    NotFound(EventId),
}

/// Result type alias for agenda operations.
pub type AgendaResult<T> = Result<T, AgendaError>;
