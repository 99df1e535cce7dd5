use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// How often a habit is supposed to be completed.
///
/// The frequency also determines when a reminder becomes due: a habit is
/// overdue once `next_due(last_reminder)` is in the past.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(Frequency::Hourly),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "biweekly" => Some(Frequency::Biweekly),
            "monthly" => Some(Frequency::Monthly),
            "quarterly" => Some(Frequency::Quarterly),
            "yearly" => Some(Frequency::Yearly),
            _ => None,
        }
    }

    /// When the next reminder is due, given the last-reminder watermark.
    ///
    /// Month-based frequencies use calendar months rather than a fixed number
    /// of days, so "monthly" lands on the same day of the next month.
    pub fn next_due(&self, last_reminder: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Hourly => last_reminder + Duration::hours(1),
            Frequency::Daily => last_reminder + Duration::days(1),
            Frequency::Weekly => last_reminder + Duration::days(7),
            Frequency::Biweekly => last_reminder + Duration::days(14),
            Frequency::Monthly => last_reminder + Months::new(1),
            Frequency::Quarterly => last_reminder + Months::new(3),
            Frequency::Yearly => last_reminder + Months::new(12),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEntry {
    pub id: String,
    pub habit_id: String,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

/// Per-habit reminder watermark. Created together with its habit and advanced
/// whenever the user records a tracking entry, never by the scheduler itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub habit_id: String,
    pub last_reminder: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitStats {
    pub habit_id: String,
    pub habit_name: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub total_entries: i64,
    pub last_completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_habits: i64,
    pub total_entries: i64,
    pub entries_today: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCompletion {
    pub date: NaiveDate,
    pub completions: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frequency_round_trips_through_its_string_form() {
        for frequency in [
            Frequency::Hourly,
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Biweekly,
            Frequency::Monthly,
            Frequency::Quarterly,
            Frequency::Yearly,
        ] {
            assert_eq!(Frequency::parse(frequency.as_str()), Some(frequency));
        }
        assert_eq!(Frequency::parse("fortnightly"), None);
    }

    #[test]
    fn frequency_serializes_lowercase() {
        let json = serde_json::to_string(&Frequency::Biweekly).unwrap();
        assert_eq!(json, "\"biweekly\"");
        let parsed: Frequency = serde_json::from_str("\"daily\"").unwrap();
        assert_eq!(parsed, Frequency::Daily);
    }

    #[test]
    fn next_due_advances_by_the_frequency_interval() {
        let last = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();

        assert_eq!(
            Frequency::Hourly.next_due(last),
            Utc.with_ymd_and_hms(2025, 1, 31, 13, 0, 0).unwrap()
        );
        assert_eq!(
            Frequency::Daily.next_due(last),
            Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Frequency::Weekly.next_due(last),
            Utc.with_ymd_and_hms(2025, 2, 7, 12, 0, 0).unwrap()
        );
        // Calendar months clamp to the last valid day.
        assert_eq!(
            Frequency::Monthly.next_due(last),
            Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Frequency::Yearly.next_due(last),
            Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn habit_uses_camel_case_wire_names() {
        let habit = Habit {
            id: "h1".into(),
            user_id: "u1".into(),
            name: "Run".into(),
            description: String::new(),
            frequency: Frequency::Daily,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };

        let value = serde_json::to_value(&habit).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["startDate"], "2025-01-01");
        assert_eq!(value["frequency"], "daily");
    }

    #[test]
    fn user_never_serializes_its_password_hash() {
        let user = User {
            id: "u1".into(),
            email: "a@b.c".into(),
            username: "alice".into(),
            password_hash: "secret".into(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("passwordHash"));
    }
}
