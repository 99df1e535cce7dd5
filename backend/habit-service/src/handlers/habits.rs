use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::{Frequency, Habit};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub frequency: Frequency,
    pub start_date: Option<NaiveDate>,
}

/// Fetch a habit and reject callers that do not own it.
pub(crate) async fn owned_habit(
    db: &dyn Database,
    habit_id: &str,
    user: &AuthUser,
) -> Result<Habit> {
    let habit = db.habit(habit_id).await?;
    if habit.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    Ok(habit)
}

/// GET /api/v1/habits
pub async fn list_habits(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
) -> Result<HttpResponse> {
    let habits = db.habits_for_user(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(habits))
}

/// POST /api/v1/habits
pub async fn create_habit(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    body: web::Json<HabitRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("habit name is required".into()));
    }

    let habit = Habit {
        id: Uuid::new_v4().to_string(),
        user_id: user.user_id,
        name: req.name,
        description: req.description,
        frequency: req.frequency,
        start_date: req.start_date.unwrap_or_else(|| Utc::now().date_naive()),
    };

    db.create_habit(&habit).await?;
    Ok(HttpResponse::Created().json(habit))
}

/// GET /api/v1/habits/{id}
pub async fn get_habit(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let habit = owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    Ok(HttpResponse::Ok().json(habit))
}

/// PUT /api/v1/habits/{id}
pub async fn update_habit(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<HabitRequest>,
) -> Result<HttpResponse> {
    let existing = owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    let req = body.into_inner();

    let habit = Habit {
        id: existing.id,
        user_id: existing.user_id,
        name: req.name,
        description: req.description,
        frequency: req.frequency,
        start_date: req.start_date.unwrap_or(existing.start_date),
    };

    db.update_habit(&habit).await?;
    Ok(HttpResponse::Ok().json(habit))
}

/// DELETE /api/v1/habits/{id}
pub async fn delete_habit(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    db.delete_habit(&path).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/habits")
            .route(web::get().to(list_habits))
            .route(web::post().to(create_habit)),
    )
    .service(
        web::resource("/api/v1/habits/{id}")
            .route(web::get().to(get_habit))
            .route(web::put().to(update_habit))
            .route(web::delete().to(delete_habit)),
    );
}
