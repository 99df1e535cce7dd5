use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::handlers::habits::owned_habit;
use crate::middleware::AuthUser;
use crate::models::TrackingEntry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRequest {
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: String,
}

/// POST /api/v1/habits/{id}/tracking
pub async fn create_tracking(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<TrackingRequest>,
) -> Result<HttpResponse> {
    let habit = owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    let req = body.into_inner();

    let entry = TrackingEntry {
        id: Uuid::new_v4().to_string(),
        habit_id: habit.id,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
        note: req.note,
    };

    db.create_tracking_entry(&entry).await?;
    Ok(HttpResponse::Created().json(entry))
}

/// GET /api/v1/habits/{id}/tracking
pub async fn list_tracking(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    owned_habit(db.get_ref().as_ref(), &path, &user).await?;
    let entries = db.tracking_entries_for_habit(&path).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// DELETE /api/v1/tracking/{id}
pub async fn delete_tracking(
    db: web::Data<Arc<dyn Database>>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let entry = db.tracking_entry(&path).await?;
    owned_habit(db.get_ref().as_ref(), &entry.habit_id, &user).await?;
    db.delete_tracking_entry(&entry.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/habits/{id}/tracking")
            .route(web::post().to(create_tracking))
            .route(web::get().to(list_tracking)),
    )
    .service(web::resource("/api/v1/tracking/{id}").route(web::delete().to(delete_tracking)));
}
