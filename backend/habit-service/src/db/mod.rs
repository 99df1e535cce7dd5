use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{Config, DatabaseDriver};
use crate::error::Result;
use crate::models::{
    DailyCompletion, Habit, HabitStats, OverallStats, Reminder, TrackingEntry, User,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryDatabase;
pub use sqlite::SqliteDatabase;

/// Storage abstraction shared by the HTTP handlers, the auth service and the
/// reminder scheduler.
///
/// Due-ness is storage's responsibility: `habits_needing_reminders` compares
/// each habit's last-reminder watermark against its frequency-derived interval
/// and returns only overdue habits, so callers never recompute it.
#[async_trait]
pub trait Database: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn create_habit(&self, habit: &Habit) -> Result<()>;
    async fn habit(&self, id: &str) -> Result<Habit>;
    async fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>>;
    async fn update_habit(&self, habit: &Habit) -> Result<()>;
    async fn delete_habit(&self, id: &str) -> Result<()>;

    async fn create_tracking_entry(&self, entry: &TrackingEntry) -> Result<()>;
    async fn tracking_entry(&self, id: &str) -> Result<TrackingEntry>;
    async fn tracking_entries_for_habit(&self, habit_id: &str) -> Result<Vec<TrackingEntry>>;
    async fn delete_tracking_entry(&self, id: &str) -> Result<()>;

    async fn reminder(&self, habit_id: &str) -> Result<Reminder>;
    async fn touch_reminder(&self, habit_id: &str, last_reminder: DateTime<Utc>) -> Result<()>;
    async fn habits_needing_reminders(&self) -> Result<Vec<Habit>>;

    async fn create_user(&self, user: &User) -> Result<()>;
    async fn user_by_email(&self, email: &str) -> Result<User>;
    async fn user_by_id(&self, id: &str) -> Result<User>;

    async fn habit_stats(&self, habit_id: &str) -> Result<HabitStats>;
    async fn overall_stats(&self, user_id: &str) -> Result<OverallStats>;
    async fn daily_completions(&self, user_id: &str, days: u32) -> Result<Vec<DailyCompletion>>;
}

/// Build the storage backend selected by configuration.
pub async fn connect(config: &Config) -> Result<Arc<dyn Database>> {
    match &config.database {
        DatabaseDriver::Memory => {
            tracing::info!("using in-memory database");
            Ok(Arc::new(MemoryDatabase::new()))
        }
        DatabaseDriver::Sqlite { path } => {
            tracing::info!(path = %path, "using sqlite database");
            Ok(Arc::new(SqliteDatabase::connect(path).await?))
        }
    }
}
