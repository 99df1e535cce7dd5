pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::ReminderService;
pub use websocket::{ConnectionHub, ServerMessage};
