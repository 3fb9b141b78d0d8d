//! Event CRUD endpoints

use agenda_core::{Event, EventId, EventPatch, NewEvent, RuleSpec};
use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, put},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/{id}", put(update_event).delete(delete_event))
}

/// Request body for creating an event
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub repeat_rule: Option<Value>,
    pub reminder_minutes: Option<Value>,
}

/// Request body for updating an event. Absent fields are left alone; an explicit
/// `null` clears the optional ones.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub duration: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub repeat_rule: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub reminder_minutes: Option<Value>,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: EventId,
}

/// Distinguish a field sent as `null` from one that was left out.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// GET /api/events - All events, ascending by instant
async fn list_events(State(state): State<AppState>) -> Json<Vec<Event>> {
    Json(state.store.list())
}

/// POST /api/events - Create a new event
async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let Json(req) = payload?;

    let repeat_rule = match &req.repeat_rule {
        Some(value) => RuleSpec::from_json(value)?,
        None => None,
    };

    let event = state.store.create(NewEvent {
        title: req.title.unwrap_or_default(),
        date: req.date.unwrap_or_default(),
        time: req.time.unwrap_or_default(),
        description: req.description,
        duration: req.duration,
        repeat_rule,
        reminder_minutes: req.reminder_minutes,
    })?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /api/events/{id} - Update some fields of an event
async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Json<Event>, AppError> {
    let Json(req) = payload?;
    let id = EventId::from(id);

    // Unknown ids are a 404 even when the body is also invalid.
    state.store.get(&id)?;

    let repeat_rule = match &req.repeat_rule {
        Some(value) => Some(RuleSpec::from_json(value)?),
        None => None,
    };

    let patch = EventPatch {
        title: req.title,
        date: req.date,
        time: req.time,
        description: req.description.map(Option::unwrap_or_default),
        duration: req.duration.map(Option::unwrap_or_default),
        repeat_rule,
        reminder_minutes: req.reminder_minutes,
    };

    let event = state.store.update(&id, patch)?;
    Ok(Json(event))
}

/// DELETE /api/events/{id} - Delete an event and its pending reminder
async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted = state.store.delete(&EventId::from(id))?;
    Ok(Json(DeletedResponse { deleted }))
}
