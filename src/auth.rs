use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::ApiError;
use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub username: String,
    pub is_admin: bool,
    pub exp: usize,
}

/// The authenticated caller, extracted from the Bearer token. The core
/// only consumes "who is this user, is this user an admin".
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
}

pub fn issue_token(user: &User, secret: &str, ttl: Duration) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        is_admin: user.is_admin,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("failed to encode token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthorized("Invalid or expired token."))
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::internal(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::internal(format!("failed to verify password: {}", e)))
}

pub fn require_admin(user: &AuthUser) -> Result<(), ApiError> {
    if !user.is_admin {
        return Err(ApiError::forbidden(
            "Only administrators can perform this action.",
        ));
    }
    Ok(())
}

fn auth_user_from_request(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| ApiError::internal("configuration missing from app data"))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header."))?;

    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Expected a Bearer token."))?;

    let claims = decode_token(token, &config.jwt_secret)?;
    Ok(AuthUser {
        id: claims.sub,
        username: claims.username,
        is_admin: claims.is_admin,
    })
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(auth_user_from_request(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_user(is_admin: bool) -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            is_admin,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn token_round_trip_preserves_claims() {
        let token = issue_token(&test_user(true), "secret", Duration::hours(1)).unwrap();
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "alice");
        assert!(claims.is_admin);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token = issue_token(&test_user(false), "secret", Duration::hours(1)).unwrap();
        assert!(matches!(
            decode_token(&token, "other-secret"),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token(&test_user(false), "secret", Duration::hours(-2)).unwrap();
        assert!(decode_token(&token, "secret").is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("pass123").unwrap();
        assert!(verify_password("pass123", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn require_admin_rejects_regular_users() {
        let user = AuthUser {
            id: 1,
            username: "bob".to_string(),
            is_admin: false,
        };
        assert!(matches!(
            require_admin(&user),
            Err(ApiError::Forbidden(_))
        ));
    }
}
