use super::strategies::DeleteStrategy;
use crate::error::{invalid_event, SyncResult};
use chrono::{DateTime, FixedOffset};
use rust_i18n::t;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the worker/resource whose calendar an operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppointmentType(String);

impl AppointmentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppointmentType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The four logical operations served by the event store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Short description of the operation in the given locale
    pub fn localized(&self, locale: &str) -> String {
        match self {
            Operation::Fetch => t!("operations.fetch", locale = locale).to_string(),
            Operation::Create => t!("operations.create", locale = locale).to_string(),
            Operation::Update => t!("operations.update", locale = locale).to_string(),
            Operation::Delete => t!("operations.delete", locale = locale).to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Fetch => "fetch",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
}

impl Attendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

/// A point in time together with the zone the remote store reported it in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// A scheduled appointment as held by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
}

/// Complete desired state of an event, sent on create and on update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub attendees: Vec<Attendee>,
}

impl EventDraft {
    pub fn new(
        summary: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: None,
            start,
            end,
            attendees: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attendee(mut self, email: impl Into<String>) -> Self {
        self.attendees.push(Attendee::new(email));
        self
    }

    /// Reject drafts the remote store must never see
    pub fn validate(&self) -> SyncResult<()> {
        if self.summary.trim().is_empty() {
            return Err(invalid_event("summary must not be empty"));
        }
        if self.end <= self.start {
            return Err(invalid_event("end must be after start"));
        }
        if self.attendees.iter().any(|a| a.email.trim().is_empty()) {
            return Err(invalid_event("attendee email must not be empty"));
        }
        Ok(())
    }
}

impl From<&CalendarEvent> for EventDraft {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: event.start.date_time,
            end: event.end.date_time,
            attendees: event.attendees.clone(),
        }
    }
}

/// What a successful response carried
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body at all, which the backend uses for "done" and "no events"
    Empty,
    Json(serde_json::Value),
    /// A body that is not JSON; kept verbatim and logged as a warning
    Malformed(String),
}

impl ResponseBody {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ResponseBody::Malformed(_))
    }
}

/// Outcome of a successful create, update or delete
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation: Operation,
    pub response: ResponseBody,
    /// Which delete strategy was accepted, for deletes only
    pub strategy: Option<DeleteStrategy>,
}

impl OperationResult {
    pub fn new(operation: Operation, response: ResponseBody) -> Self {
        Self {
            operation,
            response,
            strategy: None,
        }
    }

    /// HTTP method of the accepted delete strategy
    pub fn method(&self) -> Option<&'static str> {
        self.strategy.map(|s| s.method_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_draft_validation() {
        let draft = EventDraft::new(
            "Test drive",
            at("2024-01-01T09:00:00-03:00"),
            at("2024-01-01T10:00:00-03:00"),
        );
        assert!(draft.validate().is_ok());

        let mut blank = draft.clone();
        blank.summary = "   ".to_string();
        assert!(blank.validate().is_err());

        let mut inverted = draft.clone();
        inverted.end = inverted.start;
        assert!(inverted.validate().is_err());

        let bad_attendee = draft.with_attendee("");
        assert!(bad_attendee.validate().is_err());
    }

    #[test]
    fn test_event_wire_names() {
        let event = CalendarEvent {
            id: "evt-1".to_string(),
            summary: "Revisão".to_string(),
            description: None,
            start: EventTime {
                date_time: at("2024-01-01T09:00:00-03:00"),
                time_zone: Some("America/Sao_Paulo".to_string()),
            },
            end: EventTime {
                date_time: at("2024-01-01T10:00:00-03:00"),
                time_zone: None,
            },
            attendees: vec![Attendee::new("cliente@example.com")],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["start"]["timeZone"], "America/Sao_Paulo");
        assert!(value["start"]["dateTime"].as_str().unwrap().starts_with("2024-01-01T09:00:00"));
        assert!(value.get("description").is_none());
    }
}
