use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    DailyCompletion, Habit, HabitStats, OverallStats, Reminder, TrackingEntry, User,
};

use super::Database;

#[derive(Default)]
struct Tables {
    habits: HashMap<String, Habit>,
    tracking: HashMap<String, TrackingEntry>,
    /// Keyed by habit id; one watermark row per habit.
    reminders: HashMap<String, Reminder>,
    users: HashMap<String, User>,
}

/// In-memory storage backend. The default driver, and the one the test suite
/// runs against.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_habit(&self, habit: &Habit) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.habits.contains_key(&habit.id) {
            return Err(AppError::Duplicate);
        }

        tables.habits.insert(habit.id.clone(), habit.clone());
        tables.reminders.insert(
            habit.id.clone(),
            Reminder {
                id: format!("{}-reminder", habit.id),
                habit_id: habit.id.clone(),
                last_reminder: Utc::now(),
            },
        );
        Ok(())
    }

    async fn habit(&self, id: &str) -> Result<Habit> {
        let tables = self.tables.read().await;
        tables.habits.get(id).cloned().ok_or(AppError::NotFound)
    }

    async fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>> {
        let tables = self.tables.read().await;
        let mut habits: Vec<Habit> = tables
            .habits
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        habits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(habits)
    }

    async fn update_habit(&self, habit: &Habit) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.habits.contains_key(&habit.id) {
            return Err(AppError::NotFound);
        }
        tables.habits.insert(habit.id.clone(), habit.clone());
        Ok(())
    }

    async fn delete_habit(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.habits.remove(id).is_none() {
            return Err(AppError::NotFound);
        }
        tables.reminders.remove(id);
        tables.tracking.retain(|_, entry| entry.habit_id != id);
        Ok(())
    }

    async fn create_tracking_entry(&self, entry: &TrackingEntry) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.tracking.contains_key(&entry.id) {
            return Err(AppError::Duplicate);
        }
        tables.tracking.insert(entry.id.clone(), entry.clone());

        // Recording activity is what acknowledges a reminder: advance the
        // habit's watermark so the scheduler stops nagging.
        if let Some(reminder) = tables.reminders.get_mut(&entry.habit_id) {
            reminder.last_reminder = entry.timestamp;
        }
        Ok(())
    }

    async fn tracking_entry(&self, id: &str) -> Result<TrackingEntry> {
        let tables = self.tables.read().await;
        tables.tracking.get(id).cloned().ok_or(AppError::NotFound)
    }

    async fn tracking_entries_for_habit(&self, habit_id: &str) -> Result<Vec<TrackingEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<TrackingEntry> = tables
            .tracking
            .values()
            .filter(|e| e.habit_id == habit_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn delete_tracking_entry(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.tracking.remove(id).is_none() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn reminder(&self, habit_id: &str) -> Result<Reminder> {
        let tables = self.tables.read().await;
        tables
            .reminders
            .get(habit_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn touch_reminder(&self, habit_id: &str, last_reminder: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        let reminder = tables
            .reminders
            .get_mut(habit_id)
            .ok_or(AppError::NotFound)?;
        reminder.last_reminder = last_reminder;
        Ok(())
    }

    async fn habits_needing_reminders(&self) -> Result<Vec<Habit>> {
        let tables = self.tables.read().await;
        let now = Utc::now();

        let mut due = Vec::new();
        for (habit_id, reminder) in &tables.reminders {
            let Some(habit) = tables.habits.get(habit_id) else {
                continue;
            };
            if now > habit.frequency.next_due(reminder.last_reminder) {
                due.push(habit.clone());
            }
        }
        Ok(due)
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .values()
            .any(|u| u.email == user.email || u.username == user.username);
        if taken || tables.users.contains_key(&user.id) {
            return Err(AppError::Duplicate);
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn user_by_id(&self, id: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables.users.get(id).cloned().ok_or(AppError::NotFound)
    }

    async fn habit_stats(&self, habit_id: &str) -> Result<HabitStats> {
        let tables = self.tables.read().await;
        let habit = tables.habits.get(habit_id).ok_or(AppError::NotFound)?;

        let entries: Vec<&TrackingEntry> = tables
            .tracking
            .values()
            .filter(|e| e.habit_id == habit_id)
            .collect();

        Ok(HabitStats {
            habit_id: habit.id.clone(),
            habit_name: habit.name.clone(),
            frequency: habit.frequency,
            start_date: habit.start_date,
            total_entries: entries.len() as i64,
            last_completed: entries.iter().map(|e| e.timestamp).max(),
        })
    }

    async fn overall_stats(&self, user_id: &str) -> Result<OverallStats> {
        let tables = self.tables.read().await;
        let start_of_today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

        let mut total_habits = 0;
        let mut total_entries = 0;
        let mut entries_today = 0;

        for habit in tables.habits.values().filter(|h| h.user_id == user_id) {
            total_habits += 1;
            for entry in tables.tracking.values().filter(|e| e.habit_id == habit.id) {
                total_entries += 1;
                if entry.timestamp >= start_of_today {
                    entries_today += 1;
                }
            }
        }

        Ok(OverallStats {
            total_habits,
            total_entries,
            entries_today,
        })
    }

    async fn daily_completions(&self, user_id: &str, days: u32) -> Result<Vec<DailyCompletion>> {
        let tables = self.tables.read().await;
        let cutoff = Utc::now() - Duration::days(days as i64);

        let mut per_day: HashMap<chrono::NaiveDate, i64> = HashMap::new();
        for entry in tables.tracking.values() {
            if entry.timestamp < cutoff {
                continue;
            }
            let owned = tables
                .habits
                .get(&entry.habit_id)
                .is_some_and(|h| h.user_id == user_id);
            if owned {
                *per_day.entry(entry.timestamp.date_naive()).or_insert(0) += 1;
            }
        }

        let mut completions: Vec<DailyCompletion> = per_day
            .into_iter()
            .map(|(date, completions)| DailyCompletion { date, completions })
            .collect();
        completions.sort_by_key(|c| c.date);
        Ok(completions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::NaiveDate;

    fn habit(id: &str, user_id: &str, frequency: Frequency) -> Habit {
        Habit {
            id: id.into(),
            user_id: user_id.into(),
            name: format!("habit {id}"),
            description: String::new(),
            frequency,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    fn entry(id: &str, habit_id: &str, timestamp: DateTime<Utc>) -> TrackingEntry {
        TrackingEntry {
            id: id.into(),
            habit_id: habit_id.into(),
            timestamp,
            note: String::new(),
        }
    }

    #[tokio::test]
    async fn habit_crud_round_trip() {
        let db = MemoryDatabase::new();
        let h = habit("h1", "u1", Frequency::Daily);

        db.create_habit(&h).await.unwrap();
        assert!(matches!(
            db.create_habit(&h).await,
            Err(AppError::Duplicate)
        ));

        let fetched = db.habit("h1").await.unwrap();
        assert_eq!(fetched, h);

        let mut renamed = h.clone();
        renamed.name = "renamed".into();
        db.update_habit(&renamed).await.unwrap();
        assert_eq!(db.habit("h1").await.unwrap().name, "renamed");

        db.delete_habit("h1").await.unwrap();
        assert!(matches!(db.habit("h1").await, Err(AppError::NotFound)));
        assert!(matches!(db.reminder("h1").await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn habits_for_user_only_returns_that_users_habits() {
        let db = MemoryDatabase::new();
        db.create_habit(&habit("h1", "alice", Frequency::Daily))
            .await
            .unwrap();
        db.create_habit(&habit("h2", "bob", Frequency::Daily))
            .await
            .unwrap();

        let habits = db.habits_for_user("alice").await.unwrap();
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].id, "h1");
    }

    #[tokio::test]
    async fn creating_a_habit_starts_its_watermark_at_now() {
        let db = MemoryDatabase::new();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();

        let reminder = db.reminder("h1").await.unwrap();
        assert!(Utc::now() - reminder.last_reminder < Duration::seconds(5));
        assert!(db.habits_needing_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overdue_habits_are_reported_until_activity_is_recorded() {
        let db = MemoryDatabase::new();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.touch_reminder("h1", Utc::now() - Duration::days(2))
            .await
            .unwrap();

        let due = db.habits_needing_reminders().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "h1");

        // Logging an entry advances the watermark and clears the due state.
        db.create_tracking_entry(&entry("t1", "h1", Utc::now()))
            .await
            .unwrap();
        assert!(db.habits_needing_reminders().await.unwrap().is_empty());
        assert_eq!(
            db.reminder("h1").await.unwrap().last_reminder,
            db.tracking_entry("t1").await.unwrap().timestamp
        );
    }

    #[tokio::test]
    async fn within_interval_habits_are_not_due() {
        let db = MemoryDatabase::new();
        db.create_habit(&habit("h1", "u1", Frequency::Weekly))
            .await
            .unwrap();
        db.touch_reminder("h1", Utc::now() - Duration::days(2))
            .await
            .unwrap();

        assert!(db.habits_needing_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_or_username_is_rejected() {
        let db = MemoryDatabase::new();
        let user = User {
            id: "u1".into(),
            email: "a@b.c".into(),
            username: "alice".into(),
            password_hash: "hash".into(),
            created_at: Utc::now(),
        };
        db.create_user(&user).await.unwrap();

        let mut same_email = user.clone();
        same_email.id = "u2".into();
        same_email.username = "other".into();
        assert!(matches!(
            db.create_user(&same_email).await,
            Err(AppError::Duplicate)
        ));

        let mut same_username = user.clone();
        same_username.id = "u3".into();
        same_username.email = "other@b.c".into();
        assert!(matches!(
            db.create_user(&same_username).await,
            Err(AppError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn stats_reflect_tracking_entries() {
        let db = MemoryDatabase::new();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();

        let yesterday = Utc::now() - Duration::days(1);
        db.create_tracking_entry(&entry("t1", "h1", yesterday))
            .await
            .unwrap();
        db.create_tracking_entry(&entry("t2", "h1", Utc::now()))
            .await
            .unwrap();

        let stats = db.habit_stats("h1").await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert!(stats.last_completed.is_some());

        let overall = db.overall_stats("u1").await.unwrap();
        assert_eq!(overall.total_habits, 1);
        assert_eq!(overall.total_entries, 2);
        assert_eq!(overall.entries_today, 1);

        let daily = db.daily_completions("u1", 30).await.unwrap();
        assert_eq!(daily.len(), 2);
        assert!(daily.iter().all(|d| d.completions == 1));
    }
}
