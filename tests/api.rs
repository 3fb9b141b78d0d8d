use std::sync::Arc;

use agenda_core::{EventId, EventStore, ReminderState, TracingSink, VirtualClock};
use agenda_server::state::AppState;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: EventStore,
    clock: VirtualClock,
}

fn test_app() -> TestApp {
    let clock = VirtualClock::new(Local.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap());
    let store = EventStore::new(
        Arc::new(clock.clone()),
        Arc::new(clock.clone()),
        Arc::new(TracingSink),
    );
    let router = agenda_server::app(AppState::with_store(store.clone(), 10));

    TestApp {
        router,
        store,
        clock,
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create(&self, body: Value) -> Value {
        let (status, event) = self.send(Method::POST, "/api/events", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{event}");
        event
    }
}

fn event_id(event: &Value) -> EventId {
    EventId::from(event["id"].as_str().unwrap())
}

fn instant(value: &Value) -> DateTime<Local> {
    DateTime::parse_from_rfc3339(value.as_str().unwrap())
        .unwrap()
        .with_timezone(&Local)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();

    let (status, body) = app.send(Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn create_returns_event_and_arms_reminder() {
    let app = test_app();

    let event = app
        .create(json!({
            "title": "Standup",
            "date": "2025-03-10",
            "time": "09:00",
            "reminderMinutes": 10
        }))
        .await;

    assert_eq!(event["title"], "Standup");
    assert_eq!(event["date"], "2025-03-10");
    assert_eq!(event["time"], "09:00");
    assert_eq!(event["description"], "");
    assert_eq!(event["duration"], "");
    assert_eq!(event["repeatRule"], Value::Null);
    assert_eq!(event["reminderMinutes"], 10);
    assert_eq!(
        instant(&event["dateTime"]),
        Local.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    );

    let state = app.store.reminder_state(&event_id(&event)).unwrap();
    assert!(matches!(
        state,
        ReminderState::Pending { fire_at, .. }
            if fire_at == Local.with_ymd_and_hms(2025, 3, 10, 8, 50, 0).unwrap()
    ));
}

#[tokio::test]
async fn create_with_past_due_reminder_succeeds_without_timer() {
    let app = test_app();

    let event = app
        .create(json!({
            "title": "Coffee",
            "date": "2025-03-10",
            "time": "07:02",
            "reminderMinutes": 10
        }))
        .await;

    assert_eq!(
        app.store.reminder_state(&event_id(&event)).unwrap(),
        ReminderState::NoReminder
    );
    assert_eq!(app.clock.live_timers(), 0);
}

#[tokio::test]
async fn create_rejects_missing_fields_and_bad_input() {
    let app = test_app();

    let (status, body) = app
        .send(Method::POST, "/api/events", Some(json!({"title": "No date"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("required"));

    let (status, _) = app
        .send(
            Method::POST,
            "/api/events",
            Some(json!({"title": "Bad", "date": "someday", "time": "later"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/events",
            Some(json!({"title": "Bad rule", "date": "2025-03-10", "time": "09:00", "repeatRule": 7})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/events")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, events) = app.send(Method::GET, "/api/events", None).await;
    assert_eq!(events, json!([]));
}

#[tokio::test]
async fn list_is_sorted_by_instant() {
    let app = test_app();

    app.create(json!({"title": "Lunch", "date": "2025-03-10", "time": "12:30"}))
        .await;
    app.create(json!({"title": "Breakfast", "date": "03/10/2025", "time": "8:00 AM"}))
        .await;
    app.create(json!({"title": "Dinner", "date": "2025-03-10", "time": "7:00 PM"}))
        .await;

    let (status, events) = app.send(Method::GET, "/api/events", None).await;

    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Breakfast", "Lunch", "Dinner"]);
}

#[tokio::test]
async fn update_reschedules_reminder() {
    let app = test_app();
    let event = app
        .create(json!({
            "title": "Standup",
            "date": "2025-03-10",
            "time": "09:00",
            "description": "daily",
            "reminderMinutes": 5
        }))
        .await;
    let id = event["id"].as_str().unwrap();

    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/api/events/{id}"),
            Some(json!({"reminderMinutes": 60, "repeatRule": "FREQ=DAILY"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["reminderMinutes"], 60);
    assert_eq!(updated["repeatRule"], "FREQ=DAILY");
    assert_eq!(updated["description"], "daily");
    assert_eq!(
        app.clock.live_due_times(),
        vec![Local.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()]
    );

    let (_, cleared) = app
        .send(
            Method::PUT,
            &format!("/api/events/{id}"),
            Some(json!({"description": null, "reminderMinutes": null})),
        )
        .await;
    assert_eq!(cleared["description"], "");
    assert_eq!(cleared["reminderMinutes"], Value::Null);
    assert_eq!(app.clock.live_timers(), 0);
}

#[tokio::test]
async fn update_and_delete_unknown_ids_are_not_found() {
    let app = test_app();

    let (status, body) = app
        .send(Method::PUT, "/api/events/nope", Some(json!({"title": "x"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = app.send(Method::DELETE, "/api/events/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send(
            Method::PUT,
            "/api/events/nope",
            Some(json!({"repeatRule": 42, "date": "someday"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn delete_removes_event_and_timer() {
    let app = test_app();
    let event = app
        .create(json!({
            "title": "Standup",
            "date": "2025-03-10",
            "time": "09:00",
            "reminderMinutes": 10
        }))
        .await;
    let id = event["id"].as_str().unwrap();

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/events/{id}"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deleted": id}));
    assert_eq!(app.clock.live_timers(), 0);

    app.clock.advance(TimeDelta::hours(3));
    let (_, events) = app.send(Method::GET, "/api/events", None).await;
    assert_eq!(events, json!([]));
}

#[tokio::test]
async fn next_occurrences_expands_weekly_rule() {
    let app = test_app();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/next-occurrences",
            Some(json!({"dtstart": "2025-01-01", "rrule": {"frequency": "weekly", "interval": 1}})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let occurrences: Vec<DateTime<Local>> = body.as_array().unwrap().iter().map(instant).collect();
    let start = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    assert_eq!(occurrences.len(), 10);
    assert!(occurrences[0] >= start);
    assert!(occurrences.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn next_occurrences_accepts_text_rules_and_defaults_start() {
    let app = test_app();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/next-occurrences",
            Some(json!({"rrule": "RRULE:FREQ=DAILY;COUNT=3"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let occurrences: Vec<DateTime<Local>> = body.as_array().unwrap().iter().map(instant).collect();
    assert_eq!(occurrences.len(), 3);
    assert_eq!(occurrences[0], app.store.now());

    let (status, body) = app
        .send(Method::POST, "/api/next-occurrences", Some(json!({"rrule": null})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn next_occurrences_reports_rule_errors() {
    let app = test_app();

    for body in [
        json!({"rrule": "FREQ=SOMETIMES"}),
        json!({"rrule": 12}),
        json!({"rrule": {"interval": 2}}),
        json!({"dtstart": "not a date", "rrule": "FREQ=DAILY"}),
    ] {
        let (status, response) = app
            .send(Method::POST, "/api/next-occurrences", Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(response["error"].is_string(), "{body}");
    }
}
