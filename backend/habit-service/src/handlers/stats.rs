use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::db::Database;
use crate::error::Result;
use crate::handlers::habits::owned_habit;
use crate::middleware::AuthUser;

const DEFAULT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub days: Option<u32>,
}

/// GET /api/v1/habits/{id}/stats
pub async fn habit_stats(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    let stats = db.habit_stats(&path).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// GET /api/v1/stats
pub async fn overall_stats(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
) -> Result<HttpResponse> {
    let stats = db.overall_stats(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// GET /api/v1/stats/daily
pub async fn daily_completions(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse> {
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let completions = db.daily_completions(&user.user_id, days).await?;
    Ok(HttpResponse::Ok().json(completions))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/v1/habits/{id}/stats").route(web::get().to(habit_stats)))
        .service(web::resource("/api/v1/stats").route(web::get().to(overall_stats)))
        .service(web::resource("/api/v1/stats/daily").route(web::get().to(daily_completions)));
}
