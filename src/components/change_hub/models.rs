use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A remote table whose changes views can listen to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTopic {
    Clients,
    Appointments,
    Vehicles,
    Documents,
    Chats,
    Employees,
    GroupMessages,
}

impl ChangeTopic {
    pub const ALL: [ChangeTopic; 7] = [
        ChangeTopic::Clients,
        ChangeTopic::Appointments,
        ChangeTopic::Vehicles,
        ChangeTopic::Documents,
        ChangeTopic::Chats,
        ChangeTopic::Employees,
        ChangeTopic::GroupMessages,
    ];

    /// Name of the remote table
    pub fn table(&self) -> &'static str {
        match self {
            ChangeTopic::Clients => "clients",
            ChangeTopic::Appointments => "appointments",
            ChangeTopic::Vehicles => "vehicles",
            ChangeTopic::Documents => "documents",
            ChangeTopic::Chats => "chats",
            ChangeTopic::Employees => "employees",
            ChangeTopic::GroupMessages => "group_messages",
        }
    }
}

impl fmt::Display for ChangeTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for ChangeTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeTopic::ALL
            .into_iter()
            .find(|topic| topic.table() == s)
            .ok_or_else(|| format!("Unknown change topic: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The transport could not say what happened, only that something did
    Unknown,
}

impl ChangeKind {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "insert" => ChangeKind::Insert,
            "update" => ChangeKind::Update,
            "delete" => ChangeKind::Delete,
            _ => ChangeKind::Unknown,
        }
    }
}

/// One change notification for a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub topic: ChangeTopic,
    pub kind: ChangeKind,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(topic: ChangeTopic, kind: ChangeKind, payload: Value) -> Self {
        Self {
            topic,
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Build an event from a raw notification message.
    ///
    /// The kind is read from `type` or `eventType`; anything unreadable still
    /// produces an `Unknown` event since listeners only care that the topic changed.
    pub fn from_notification(topic: ChangeTopic, raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(payload) => {
                let kind = payload
                    .get("type")
                    .or_else(|| payload.get("eventType"))
                    .and_then(|k| k.as_str())
                    .map(ChangeKind::parse)
                    .unwrap_or(ChangeKind::Unknown);
                Self::new(topic, kind, payload)
            }
            Err(_) => Self::new(topic, ChangeKind::Unknown, Value::String(raw.to_string())),
        }
    }
}
