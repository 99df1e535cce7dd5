use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthService;
use crate::error::Result;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn register(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    let user = auth.register(&req.email, &req.username, &req.password).await?;

    Ok(HttpResponse::Created().json(json!({
        "user": user,
        "message": "user registered successfully"
    })))
}

/// POST /api/v1/auth/login
pub async fn login(
    auth: web::Data<Arc<AuthService>>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    let (token, user) = auth.login(&req.email, &req.password).await?;

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": user
    })))
}

/// GET /api/v1/auth/me
pub async fn me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "user": {
            "id": user.user_id,
            "email": user.email,
            "username": user.username
        }
    }))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/v1/auth/register").route(web::post().to(register)))
        .service(web::resource("/api/v1/auth/login").route(web::post().to(login)))
        .service(web::resource("/api/v1/auth/me").route(web::get().to(me)));
}
