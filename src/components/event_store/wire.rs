use super::models::{Attendee, CalendarEvent, EventDraft, EventTime, ResponseBody};
use crate::error::{Error, SyncResult};
use crate::utils::time::{format_remote_timestamp, parse_remote_date, parse_remote_timestamp, resolve_zone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Title given to remote events that arrive without one
pub const UNTITLED: &str = "(untitled)";

/// Classify a successful response body
pub fn classify_body(body: &str) -> ResponseBody {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return ResponseBody::Empty;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => ResponseBody::Json(value),
        Err(e) => {
            warn!("Response body is not JSON ({}), treating it as an acknowledgement", e);
            ResponseBody::Malformed(body.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Serialize)]
struct WireEvent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    summary: &'a str,
    description: &'a str,
    start: WireTime,
    end: WireTime,
    attendees: &'a [Attendee],
}

/// JSON payload for create (`id` absent) and update (`id` present)
pub fn event_payload(draft: &EventDraft, id: Option<&str>, zone: Tz) -> SyncResult<Value> {
    let time_zone = zone.name().to_string();
    let event = WireEvent {
        id,
        summary: draft.summary.trim(),
        description: draft.description.as_deref().unwrap_or(""),
        start: WireTime {
            date_time: format_remote_timestamp(&draft.start, zone),
            time_zone: time_zone.clone(),
        },
        end: WireTime {
            date_time: format_remote_timestamp(&draft.end, zone),
            time_zone,
        },
        attendees: &draft.attendees,
    };
    Ok(serde_json::to_value(event)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTime {
    date_time: Option<String>,
    date: Option<String>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteAttendee {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteEvent {
    id: Option<Value>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<RemoteTime>,
    end: Option<RemoteTime>,
    #[serde(default)]
    attendees: Vec<RemoteAttendee>,
}

/// Convert a fetch response into events.
///
/// Accepts a bare array, an object with an `items` array, or a single event
/// object. Entries that cannot be converted are skipped with a warning.
pub fn events_from_value(value: Value, zone: Tz) -> Vec<CalendarEvent> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!("Ignoring non-array items field in events response: {}", other);
                Vec::new()
            }
            None if object.contains_key("id") => vec![Value::Object(object)],
            None => {
                warn!("Events response object has neither items nor id");
                Vec::new()
            }
        },
        Value::Null => Vec::new(),
        other => {
            warn!("Unexpected events response shape: {}", other);
            Vec::new()
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match event_from_value(entry, zone) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping unusable event entry: {}", e);
                None
            }
        })
        .collect()
}

fn event_from_value(value: Value, zone: Tz) -> SyncResult<CalendarEvent> {
    let remote: RemoteEvent = serde_json::from_value(value)?;

    let id = match remote.id {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(Error::Serialization("event has no id".to_string())),
    };

    let start = event_time(remote.start, zone, "start")?;
    let end = event_time(remote.end, zone, "end")?;
    if end.date_time <= start.date_time {
        return Err(Error::Serialization(format!(
            "event {} does not end after it starts",
            id
        )));
    }

    let summary = remote
        .summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let attendees = remote
        .attendees
        .into_iter()
        .filter_map(|a| a.email)
        .filter(|email| !email.is_empty())
        .map(Attendee::new)
        .collect();

    Ok(CalendarEvent {
        id,
        summary,
        description: remote.description.filter(|d| !d.is_empty()),
        start,
        end,
        attendees,
    })
}

fn event_time(time: Option<RemoteTime>, fallback: Tz, field: &str) -> SyncResult<EventTime> {
    let time = time.ok_or_else(|| Error::Serialization(format!("event has no {}", field)))?;
    let zone = resolve_zone(time.time_zone.as_deref(), fallback);

    let date_time = match (time.date_time.as_deref(), time.date.as_deref()) {
        (Some(dt), _) => parse_remote_timestamp(dt, zone)?,
        (None, Some(date)) => parse_remote_date(date, zone)?,
        (None, None) => {
            return Err(Error::Serialization(format!("event {} has no time", field)))
        }
    };

    Ok(EventTime {
        date_time,
        time_zone: time.time_zone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use chrono_tz::America::Sao_Paulo;
    use serde_json::json;

    #[test]
    fn test_classify_body() {
        assert_eq!(classify_body(""), ResponseBody::Empty);
        assert_eq!(classify_body("  \n"), ResponseBody::Empty);
        assert_eq!(classify_body(r#"{"ok":true}"#), ResponseBody::Json(json!({"ok": true})));
        assert!(classify_body("Workflow was started").is_malformed());
    }

    #[test]
    fn test_payload_shape() {
        let draft = EventDraft::new(
            " Test drive ",
            DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z").unwrap(),
            DateTime::parse_from_rfc3339("2024-01-01T13:00:00Z").unwrap(),
        )
        .with_attendee("cliente@example.com");

        let payload = event_payload(&draft, None, Sao_Paulo).unwrap();
        assert_eq!(
            payload,
            json!({
                "summary": "Test drive",
                "description": "",
                "start": {"dateTime": "2024-01-01T09:00:00-03:00", "timeZone": "America/Sao_Paulo"},
                "end": {"dateTime": "2024-01-01T10:00:00-03:00", "timeZone": "America/Sao_Paulo"},
                "attendees": [{"email": "cliente@example.com"}]
            })
        );

        let payload = event_payload(&draft, Some("evt-9"), Sao_Paulo).unwrap();
        assert_eq!(payload["id"], "evt-9");
    }

    #[test]
    fn test_events_from_array_and_items() {
        let entry = json!({
            "id": "evt-1",
            "summary": "Entrega",
            "start": {"dateTime": "2024-01-01T09:00:00-03:00"},
            "end": {"dateTime": "2024-01-01T10:00:00-03:00"},
            "attendees": [{"email": "a@example.com"}, {"email": null}]
        });

        let events = events_from_value(json!([entry.clone()]), Sao_Paulo);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Entrega");
        assert_eq!(events[0].attendees, vec![Attendee::new("a@example.com")]);

        let events = events_from_value(json!({"items": [entry.clone()]}), Sao_Paulo);
        assert_eq!(events.len(), 1);

        let events = events_from_value(entry, Sao_Paulo);
        assert_eq!(events[0].id, "evt-1");
    }

    #[test]
    fn test_bad_entries_are_skipped() {
        let events = events_from_value(
            json!([
                {"id": "ok", "start": {"date": "2024-01-02"}, "end": {"date": "2024-01-03"}},
                {"summary": "no id", "start": {"date": "2024-01-02"}, "end": {"date": "2024-01-03"}},
                {"id": "no-end", "start": {"date": "2024-01-02"}},
                "garbage"
            ]),
            Sao_Paulo,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, UNTITLED);
        assert_eq!(events[0].start.date_time.to_rfc3339(), "2024-01-02T00:00:00-03:00");
    }

    #[test]
    fn test_inverted_and_zero_length_entries_are_skipped() {
        let events = events_from_value(
            json!([
                {"id": "inverted",
                 "start": {"dateTime": "2024-01-01T10:00:00-03:00"},
                 "end": {"dateTime": "2024-01-01T09:00:00-03:00"}},
                {"id": "instant",
                 "start": {"dateTime": "2024-01-01T10:00:00-03:00"},
                 "end": {"dateTime": "2024-01-01T13:00:00Z"}},
                {"id": "fine",
                 "start": {"dateTime": "2024-01-01T10:00:00-03:00"},
                 "end": {"dateTime": "2024-01-01T11:00:00-03:00"}}
            ]),
            Sao_Paulo,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "fine");
    }

    #[test]
    fn test_naive_times_use_entry_zone() {
        let events = events_from_value(
            json!([{
                "id": 42,
                "summary": "Revisão",
                "start": {"dateTime": "2024-01-01T09:00:00", "timeZone": "Europe/Helsinki"},
                "end": {"dateTime": "2024-01-01T10:00:00"}
            }]),
            Sao_Paulo,
        );
        assert_eq!(events[0].id, "42");
        assert_eq!(events[0].start.date_time.to_rfc3339(), "2024-01-01T09:00:00+02:00");
        assert_eq!(events[0].end.date_time.to_rfc3339(), "2024-01-01T10:00:00-03:00");
    }
}
