//! Recurrence preview endpoint

use agenda_core::{datetime, recurrence, RuleSpec};
use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
    Json,
};
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::Value;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/next-occurrences", post(next_occurrences))
}

/// Request body for previewing a rule
#[derive(Deserialize)]
pub struct NextOccurrencesRequest {
    /// Anchor instant; defaults to now
    pub dtstart: Option<String>,
    /// Rule text, structured rule object, or null
    #[serde(default)]
    pub rrule: Value,
}

/// POST /api/next-occurrences - Expand a rule without storing anything
async fn next_occurrences(
    State(state): State<AppState>,
    payload: Result<Json<NextOccurrencesRequest>, JsonRejection>,
) -> Result<Json<Vec<DateTime<Local>>>, AppError> {
    let Json(req) = payload?;

    let start = match req.dtstart.as_deref().map(str::trim) {
        Some(dtstart) if !dtstart.is_empty() => datetime::parse_instant(dtstart)?,
        _ => state.store.now(),
    };
    let rule = RuleSpec::from_json(&req.rrule)?;

    let occurrences = recurrence::expand(start, rule.as_ref(), state.occurrence_limit)?;
    Ok(Json(occurrences))
}
