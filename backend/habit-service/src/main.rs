use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use habit_service::auth::AuthService;
use habit_service::handlers::{auth as auth_routes, habits, stats, tracking, websocket};
use habit_service::{Config, ConnectionHub, ReminderService};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting habit service");

    let config = Config::from_env()?;

    let database = habit_service::db::connect(&config).await?;
    database.ping().await?;

    let auth_service = Arc::new(AuthService::new(
        database.clone(),
        &config.jwt_secret,
        config.token_expiry_hours,
    ));

    let hub = ConnectionHub::new();
    {
        let hub = hub.clone();
        tokio::spawn(async move { hub.run_broadcast_loop().await });
    }

    let reminder_service = ReminderService::new(database.clone(), hub.clone())
        .with_check_interval(config.reminder_interval);
    reminder_service.start();

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%addr, "starting http server");

    let database_data = web::Data::new(database);
    let auth_data = web::Data::new(auth_service);
    let hub_data = web::Data::new(hub);

    HttpServer::new(move || {
        App::new()
            .app_data(database_data.clone())
            .app_data(auth_data.clone())
            .app_data(hub_data.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(|| async { "OK" }))
            .configure(auth_routes::register_routes)
            .configure(habits::register_routes)
            .configure(tracking::register_routes)
            .configure(stats::register_routes)
            .configure(websocket::register_routes)
    })
    .bind(&addr)?
    .run()
    .await?;

    reminder_service.stop();
    Ok(())
}
