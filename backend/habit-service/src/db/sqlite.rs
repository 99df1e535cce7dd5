use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::error::{AppError, Result};
use crate::models::{
    DailyCompletion, Frequency, Habit, HabitStats, OverallStats, Reminder, TrackingEntry, User,
};

use super::Database;

/// SQLite storage backend over an sqlx connection pool.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// A private in-memory database, used by the test suite. Capped at one
    /// connection because every SQLite `:memory:` connection is its own
    /// database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS habits (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                frequency TEXT NOT NULL,
                start_date TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracking_entries (
                id TEXT PRIMARY KEY,
                habit_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (habit_id) REFERENCES habits(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                habit_id TEXT NOT NULL UNIQUE,
                last_reminder TEXT NOT NULL,
                FOREIGN KEY (habit_id) REFERENCES habits(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// UNIQUE violations surface as 409s, everything else as a storage error.
fn map_insert_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.message().contains("UNIQUE constraint failed") {
            return AppError::Duplicate;
        }
    }
    e.into()
}

fn habit_from_row(row: &SqliteRow) -> Result<Habit> {
    let frequency: String = row.get("frequency");
    Ok(Habit {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        description: row.get("description"),
        frequency: Frequency::parse(&frequency).ok_or_else(|| {
            AppError::Database(format!("invalid frequency {frequency:?} in habits table"))
        })?,
        start_date: row.get("start_date"),
    })
}

fn entry_from_row(row: &SqliteRow) -> TrackingEntry {
    TrackingEntry {
        id: row.get("id"),
        habit_id: row.get("habit_id"),
        timestamp: row.get("timestamp"),
        note: row.get("note"),
    }
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_habit(&self, habit: &Habit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO habits (id, user_id, name, description, frequency, start_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&habit.id)
        .bind(&habit.user_id)
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(habit.frequency.as_str())
        .bind(habit.start_date)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        sqlx::query("INSERT INTO reminders (id, habit_id, last_reminder) VALUES (?1, ?2, ?3)")
            .bind(format!("{}-reminder", habit.id))
            .bind(&habit.id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn habit(&self, id: &str) -> Result<Habit> {
        let row = sqlx::query(
            "SELECT id, user_id, name, description, frequency, start_date
             FROM habits WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        habit_from_row(&row)
    }

    async fn habits_for_user(&self, user_id: &str) -> Result<Vec<Habit>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, description, frequency, start_date
             FROM habits WHERE user_id = ?1 ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(habit_from_row).collect()
    }

    async fn update_habit(&self, habit: &Habit) -> Result<()> {
        let result = sqlx::query(
            "UPDATE habits SET name = ?1, description = ?2, frequency = ?3, start_date = ?4
             WHERE id = ?5",
        )
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(habit.frequency.as_str())
        .bind(habit.start_date)
        .bind(&habit.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_habit(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM habits WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn create_tracking_entry(&self, entry: &TrackingEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO tracking_entries (id, habit_id, timestamp, note) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&entry.id)
        .bind(&entry.habit_id)
        .bind(entry.timestamp)
        .bind(&entry.note)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        // Recording activity acknowledges any outstanding reminder.
        sqlx::query("UPDATE reminders SET last_reminder = ?1 WHERE habit_id = ?2")
            .bind(entry.timestamp)
            .bind(&entry.habit_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn tracking_entry(&self, id: &str) -> Result<TrackingEntry> {
        let row = sqlx::query(
            "SELECT id, habit_id, timestamp, note FROM tracking_entries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(entry_from_row(&row))
    }

    async fn tracking_entries_for_habit(&self, habit_id: &str) -> Result<Vec<TrackingEntry>> {
        let rows = sqlx::query(
            "SELECT id, habit_id, timestamp, note FROM tracking_entries
             WHERE habit_id = ?1 ORDER BY timestamp DESC",
        )
        .bind(habit_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn delete_tracking_entry(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tracking_entries WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn reminder(&self, habit_id: &str) -> Result<Reminder> {
        let row = sqlx::query(
            "SELECT id, habit_id, last_reminder FROM reminders WHERE habit_id = ?1",
        )
        .bind(habit_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(Reminder {
            id: row.get("id"),
            habit_id: row.get("habit_id"),
            last_reminder: row.get("last_reminder"),
        })
    }

    async fn touch_reminder(&self, habit_id: &str, last_reminder: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE reminders SET last_reminder = ?1 WHERE habit_id = ?2")
            .bind(last_reminder)
            .bind(habit_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn habits_needing_reminders(&self) -> Result<Vec<Habit>> {
        let rows = sqlx::query(
            "SELECT h.id, h.user_id, h.name, h.description, h.frequency, h.start_date,
                    r.last_reminder
             FROM habits h JOIN reminders r ON h.id = r.habit_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now();
        let mut due = Vec::new();
        for row in &rows {
            let habit = habit_from_row(row)?;
            let last_reminder: DateTime<Utc> = row.get("last_reminder");
            if now > habit.frequency.next_due(last_reminder) {
                due.push(habit);
            }
        }
        Ok(due)
    }

    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, email, username, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(user_from_row(&row))
    }

    async fn user_by_id(&self, id: &str) -> Result<User> {
        let row = sqlx::query(
            "SELECT id, email, username, password_hash, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(user_from_row(&row))
    }

    async fn habit_stats(&self, habit_id: &str) -> Result<HabitStats> {
        let habit = self.habit(habit_id).await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total, MAX(timestamp) AS last
             FROM tracking_entries WHERE habit_id = ?1",
        )
        .bind(habit_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(HabitStats {
            habit_id: habit.id,
            habit_name: habit.name,
            frequency: habit.frequency,
            start_date: habit.start_date,
            total_entries: row.get("total"),
            last_completed: row.get("last"),
        })
    }

    async fn overall_stats(&self, user_id: &str) -> Result<OverallStats> {
        let start_of_today = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM habits WHERE user_id = ?1) AS total_habits,
                (SELECT COUNT(*) FROM tracking_entries te
                 JOIN habits h ON h.id = te.habit_id
                 WHERE h.user_id = ?1) AS total_entries,
                (SELECT COUNT(*) FROM tracking_entries te
                 JOIN habits h ON h.id = te.habit_id
                 WHERE h.user_id = ?1 AND te.timestamp >= ?2) AS entries_today",
        )
        .bind(user_id)
        .bind(start_of_today)
        .fetch_one(&self.pool)
        .await?;

        Ok(OverallStats {
            total_habits: row.get("total_habits"),
            total_entries: row.get("total_entries"),
            entries_today: row.get("entries_today"),
        })
    }

    async fn daily_completions(&self, user_id: &str, days: u32) -> Result<Vec<DailyCompletion>> {
        let cutoff = Utc::now() - Duration::days(days as i64);

        let rows = sqlx::query(
            "SELECT date(te.timestamp) AS day, COUNT(*) AS completions
             FROM tracking_entries te
             JOIN habits h ON h.id = te.habit_id
             WHERE h.user_id = ?1 AND te.timestamp >= ?2
             GROUP BY day ORDER BY day",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut completions = Vec::with_capacity(rows.len());
        for row in &rows {
            let day: String = row.get("day");
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| AppError::Database(format!("invalid date {day:?}: {e}")))?;
            completions.push(DailyCompletion {
                date,
                completions: row.get("completions"),
            });
        }
        Ok(completions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn habit(id: &str, user_id: &str, frequency: Frequency) -> Habit {
        Habit {
            id: id.into(),
            user_id: user_id.into(),
            name: format!("habit {id}"),
            description: "desc".into(),
            frequency,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn habit_round_trip_preserves_fields() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let h = habit("h1", "u1", Frequency::Biweekly);

        db.create_habit(&h).await.unwrap();
        let fetched = db.habit("h1").await.unwrap();
        assert_eq!(fetched, h);

        assert!(matches!(
            db.create_habit(&h).await,
            Err(AppError::Duplicate)
        ));
        assert!(matches!(db.habit("missing").await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn deleting_a_habit_cascades_to_reminders_and_entries() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.create_tracking_entry(&TrackingEntry {
            id: "t1".into(),
            habit_id: "h1".into(),
            timestamp: Utc::now(),
            note: String::new(),
        })
        .await
        .unwrap();

        db.delete_habit("h1").await.unwrap();
        assert!(matches!(db.reminder("h1").await, Err(AppError::NotFound)));
        assert!(matches!(
            db.tracking_entry("t1").await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn due_habits_match_the_watermark_and_frequency() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        db.create_habit(&habit("due", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.create_habit(&habit("fresh", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.touch_reminder("due", Utc::now() - Duration::days(2))
            .await
            .unwrap();

        let due = db.habits_needing_reminders().await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "due");
    }

    #[tokio::test]
    async fn tracking_entry_advances_the_watermark() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.touch_reminder("h1", Utc::now() - Duration::days(3))
            .await
            .unwrap();

        let stamp = Utc::now();
        db.create_tracking_entry(&TrackingEntry {
            id: "t1".into(),
            habit_id: "h1".into(),
            timestamp: stamp,
            note: "done".into(),
        })
        .await
        .unwrap();

        let watermark = db.reminder("h1").await.unwrap().last_reminder;
        assert!((watermark - stamp).num_seconds().abs() < 2);
        assert!(db.habits_needing_reminders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_user_constraints_map_to_duplicate() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let user = User {
            id: "u1".into(),
            email: "a@b.c".into(),
            username: "alice".into(),
            password_hash: "hash".into(),
            created_at: Utc::now(),
        };
        db.create_user(&user).await.unwrap();

        let mut clash = user.clone();
        clash.id = "u2".into();
        assert!(matches!(
            db.create_user(&clash).await,
            Err(AppError::Duplicate)
        ));

        let fetched = db.user_by_email("a@b.c").await.unwrap();
        assert_eq!(fetched.username, "alice");
    }

    #[tokio::test]
    async fn stats_aggregate_per_user() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        db.create_habit(&habit("h1", "u1", Frequency::Daily))
            .await
            .unwrap();
        db.create_habit(&habit("h2", "someone-else", Frequency::Daily))
            .await
            .unwrap();

        for (id, habit_id) in [("t1", "h1"), ("t2", "h1"), ("t3", "h2")] {
            db.create_tracking_entry(&TrackingEntry {
                id: id.into(),
                habit_id: habit_id.into(),
                timestamp: Utc::now(),
                note: String::new(),
            })
            .await
            .unwrap();
        }

        let stats = db.habit_stats("h1").await.unwrap();
        assert_eq!(stats.total_entries, 2);

        let overall = db.overall_stats("u1").await.unwrap();
        assert_eq!(overall.total_habits, 1);
        assert_eq!(overall.total_entries, 2);
        assert_eq!(overall.entries_today, 2);

        let daily = db.daily_completions("u1", 7).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].completions, 2);
    }
}
