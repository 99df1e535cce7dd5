use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

/// Which storage backend to run against. SQLite is selected by setting
/// `DB_PATH`; without it the service runs fully in memory.
#[derive(Debug, Clone)]
pub enum DatabaseDriver {
    Memory,
    Sqlite { path: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database: DatabaseDriver,
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub reminder_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let database = match env::var("DB_PATH") {
            Ok(path) => DatabaseDriver::Sqlite { path },
            Err(_) => DatabaseDriver::Memory,
        };

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;

        let token_expiry_hours = env::var("TOKEN_EXPIRY_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24);

        let reminder_interval = env::var("REMINDER_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Ok(Self {
            port,
            database,
            jwt_secret,
            token_expiry_hours,
            reminder_interval,
        })
    }
}
