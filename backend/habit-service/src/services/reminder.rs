use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::db::Database;
use crate::error::Result;
use crate::models::Habit;
use crate::websocket::{ConnectionHub, ServerMessage};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Periodically pushes reminders for overdue habits to their owners.
///
/// Fire-and-forget background work: nothing here propagates errors to a
/// caller. A failed due-habits query aborts the current pass only; a failed
/// delivery skips that habit only. The scheduler never advances the
/// last-reminder watermark itself -- recording a tracking entry does -- so a
/// reminder repeats every interval until the user logs activity.
pub struct ReminderService {
    database: Arc<dyn Database>,
    hub: ConnectionHub,
    check_interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl ReminderService {
    pub fn new(database: Arc<dyn Database>, hub: ConnectionHub) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            database,
            hub,
            check_interval: DEFAULT_CHECK_INTERVAL,
            shutdown,
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Spawn the scan loop. The first pass runs immediately, so a freshly
    /// started process does not wait a full interval before checking. Scans
    /// run on the loop task itself: a slow pass delays the next tick instead
    /// of overlapping it.
    pub fn start(&self) {
        tracing::info!(interval = ?self.check_interval, "starting reminder service");

        let database = self.database.clone();
        let hub = self.hub.clone();
        let mut shutdown = self.shutdown.subscribe();
        let check_interval = self.check_interval;

        tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => scan(database.as_ref(), &hub).await,
                    _ = shutdown.changed() => {
                        tracing::info!("reminder service stopped");
                        return;
                    }
                }
            }
        });
    }

    /// Signal the loop to exit after any in-flight scan. Safe to call more
    /// than once.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// One scan pass: ask storage which habits are overdue and push a reminder to
/// each habit's owner. Delivery failures are independent per habit.
async fn scan(database: &dyn Database, hub: &ConnectionHub) {
    tracing::debug!("checking for habits needing reminders");

    let habits = match database.habits_needing_reminders().await {
        Ok(habits) => habits,
        Err(e) => {
            tracing::error!(error = %e, "failed to query habits needing reminders");
            return;
        }
    };

    if habits.is_empty() {
        tracing::debug!("no habits need reminders");
        return;
    }

    for habit in &habits {
        if let Err(e) = send_reminder(hub, habit).await {
            tracing::warn!(
                habit_id = %habit.id,
                habit_name = %habit.name,
                error = %e,
                "failed to deliver reminder"
            );
        }
    }
}

async fn send_reminder(hub: &ConnectionHub, habit: &Habit) -> Result<()> {
    let payload = ServerMessage::reminder(habit).to_json()?;
    hub.send_to_user(&habit.user_id, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;
    use crate::models::Frequency;
    use chrono::{NaiveDate, Utc};
    use tokio::sync::mpsc::unbounded_channel;

    fn habit(id: &str, user_id: &str, name: &str) -> Habit {
        Habit {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
            description: String::new(),
            frequency: Frequency::Daily,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        }
    }

    async fn overdue_habit(db: &MemoryDatabase, h: &Habit) {
        db.create_habit(h).await.unwrap();
        db.touch_reminder(&h.id, Utc::now() - chrono::Duration::days(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_scan_delivers_one_reminder_to_the_owner() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        let (tx, mut rx) = unbounded_channel();
        let conn = hub.register(tx).await;
        hub.authenticate(conn, "user-123".into()).await;

        overdue_habit(&db, &habit("h1", "user-123", "Run")).await;

        scan(db.as_ref(), &hub).await;

        let frame = rx.try_recv().expect("one reminder frame");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "reminder");
        assert_eq!(value["data"]["habitId"], "h1");
        assert_eq!(value["data"]["habitName"], "Run");
        assert_eq!(value["data"]["frequency"], "daily");

        // Exactly one: nothing else queued for this pass.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn habits_within_their_interval_produce_no_send() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        let (tx, mut rx) = unbounded_channel();
        let conn = hub.register(tx).await;
        hub.authenticate(conn, "user-123".into()).await;

        // Watermark starts at now, well inside the daily interval.
        db.create_habit(&habit("h1", "user-123", "Run"))
            .await
            .unwrap();

        scan(db.as_ref(), &hub).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn reminders_route_by_habit_ownership() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        let (tx_alice, mut rx_alice) = unbounded_channel();
        let alice = hub.register(tx_alice).await;
        hub.authenticate(alice, "alice".into()).await;

        let (tx_bob, mut rx_bob) = unbounded_channel();
        let bob = hub.register(tx_bob).await;
        hub.authenticate(bob, "bob".into()).await;

        overdue_habit(&db, &habit("h1", "alice", "Run")).await;

        scan(db.as_ref(), &hub).await;

        assert!(rx_alice.try_recv().is_ok());
        assert!(rx_bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn a_failed_delivery_does_not_abort_the_rest_of_the_scan() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        // Dead connection for alice, live one for bob.
        let (tx_dead, rx_dead) = unbounded_channel();
        drop(rx_dead);
        let alice = hub.register(tx_dead).await;
        hub.authenticate(alice, "alice".into()).await;

        let (tx_bob, mut rx_bob) = unbounded_channel();
        let bob = hub.register(tx_bob).await;
        hub.authenticate(bob, "bob".into()).await;

        overdue_habit(&db, &habit("h1", "alice", "Run")).await;
        overdue_habit(&db, &habit("h2", "bob", "Read")).await;

        scan(db.as_ref(), &hub).await;

        let frame = rx_bob.try_recv().expect("bob still gets his reminder");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["data"]["habitId"], "h2");
    }

    #[tokio::test]
    async fn reminders_for_disconnected_owners_are_dropped_silently() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        overdue_habit(&db, &habit("h1", "nobody-home", "Run")).await;

        // No connections at all; the scan simply drops the reminder.
        scan(db.as_ref(), &hub).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn stop_is_safe_to_call_repeatedly() {
        let db = Arc::new(MemoryDatabase::new());
        let hub = ConnectionHub::new();

        let service = ReminderService::new(db, hub).with_check_interval(Duration::from_secs(1));
        service.start();
        service.stop();
        service.stop();
    }
}
