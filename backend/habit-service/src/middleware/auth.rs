use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::http::header;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};

use crate::auth::AuthService;
use crate::error::AppError;

/// The authenticated caller, extracted from the `Authorization: Bearer` header.
///
/// Handlers that take an `AuthUser` argument reject unauthenticated requests
/// with 401 before the handler body runs. Claims are trusted as-is; no
/// database lookup happens per request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub username: String,
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let Some(auth) = req.app_data::<web::Data<Arc<AuthService>>>() else {
        tracing::error!("auth service is not registered in app data");
        return Err(AppError::Internal("auth service not configured".into()));
    };

    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;

    let claims = auth.validate_token(token)?;
    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        username: claims.username,
    })
}
