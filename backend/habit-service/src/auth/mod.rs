use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::User;

const MIN_PASSWORD_LENGTH: usize = 8;

/// JWT claims carried by every API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Registration, login and token handling on top of the storage layer.
///
/// Passwords are hashed with Argon2id; tokens are HS256 JWTs signed with the
/// configured secret.
pub struct AuthService {
    database: Arc<dyn Database>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry: Duration,
}

impl AuthService {
    pub fn new(database: Arc<dyn Database>, jwt_secret: &str, token_expiry_hours: i64) -> Self {
        Self {
            database,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_expiry: Duration::hours(token_expiry_hours),
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AppError::Internal(format!("invalid password hash: {e}")))?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::Internal(format!(
                "password verification failed: {e}"
            ))),
        }
    }

    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<User> {
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::BadRequest("a valid email is required".into()));
        }
        if username.is_empty() {
            return Err(AppError::BadRequest("username is required".into()));
        }

        let password_hash = self.hash_password(password)?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            created_at: Utc::now(),
        };

        self.database.create_user(&user).await?;
        tracing::info!(user_id = %user.id, "registered new user");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(String, User)> {
        let user = match self.database.user_by_email(email).await {
            Ok(user) => user,
            Err(AppError::NotFound) => return Err(AppError::Unauthorized),
            Err(e) => return Err(e),
        };

        if !self.verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized);
        }

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.token_expiry).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "rejected token");
            AppError::Unauthorized
        })?;

        Ok(data.claims)
    }

    pub async fn user_from_token(&self, token: &str) -> Result<User> {
        let claims = self.validate_token(token)?;
        self.database.user_by_id(&claims.sub).await
    }
}
