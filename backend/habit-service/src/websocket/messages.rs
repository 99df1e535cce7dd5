use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Habit;

/// Envelope type for the client's identity announcement.
pub const AUTH_FRAME: &str = "auth";

/// Inbound client frame: a type tag plus an opaque body. Anything that is not
/// an identity announcement is relayed to all connections verbatim.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// Body of an `auth` envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user_id: String,
}

/// Server-originated messages, serialized as the same `{type, data}` envelope
/// the clients send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ServerMessage {
    Reminder(ReminderData),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderData {
    pub habit_id: String,
    pub habit_name: String,
    pub description: String,
    pub frequency: String,
    pub timestamp: DateTime<Utc>,
}

impl ServerMessage {
    pub fn reminder(habit: &Habit) -> Self {
        ServerMessage::Reminder(ReminderData {
            habit_id: habit.id.clone(),
            habit_name: habit.name.clone(),
            description: habit.description.clone(),
            frequency: habit.frequency.as_str().to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::NaiveDate;

    #[test]
    fn reminder_serializes_to_the_wire_envelope() {
        let habit = Habit {
            id: "h1".into(),
            user_id: "u1".into(),
            name: "Run".into(),
            description: "around the block".into(),
            frequency: Frequency::Daily,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };

        let json = ServerMessage::reminder(&habit).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "reminder");
        assert_eq!(value["data"]["habitId"], "h1");
        assert_eq!(value["data"]["habitName"], "Run");
        assert_eq!(value["data"]["frequency"], "daily");
        // RFC3339 timestamps parse back.
        let stamp = value["data"]["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn auth_envelope_parses_its_user_id() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"type":"auth","data":{"userId":"user-123"}}"#).unwrap();
        assert_eq!(envelope.kind, AUTH_FRAME);

        let auth: AuthData = serde_json::from_value(envelope.data).unwrap();
        assert_eq!(auth.user_id, "user-123");
    }

    #[test]
    fn envelopes_without_a_body_still_parse() {
        let envelope: Envelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(envelope.kind, "ping");
        assert!(envelope.data.is_null());
    }
}
