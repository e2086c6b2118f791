use std::sync::OnceLock;

use actix_web::{get, post, web, HttpResponse};
use chrono::Duration;
use regex::Regex;

use crate::auth::{self, AuthUser};
use crate::config::Config;
use crate::errors::ApiError;
use crate::models::{LoginRequest, MeResponse, RegisterRequest, TokenResponse, User, UserResponse};
use crate::{actions, DbPool};

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").unwrap())
}

#[post("/api/auth/register")]
pub async fn register(
    pool: web::Data<DbPool>,
    form: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

    if !username_regex().is_match(&form.username) {
        return Err(ApiError::validation(
            "Username should contain only letters, digits and underscores.",
        ));
    }
    if form.password.len() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters long.",
        ));
    }

    // Normalize email to lowercase for consistency
    let email = form.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::validation("Email is required."));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("A valid email address is required."));
    }

    let user = web::block(move || -> Result<User, ApiError> {
        let password_hash = auth::hash_password(&form.password)?;
        let mut conn = pool.get()?;
        actions::create_user(&mut conn, &form.username, &email, &password_hash)
    })
    .await??;

    log::info!("registered user '{}'", user.username);
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

#[post("/api/auth/login")]
pub async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    form: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();

    let user = web::block(move || -> Result<User, ApiError> {
        let mut conn = pool.get()?;
        let user = actions::find_user_by_username(&mut conn, &form.username)?
            .ok_or_else(|| ApiError::validation("Invalid username or password."))?;
        if !auth::verify_password(&form.password, &user.password_hash)? {
            return Err(ApiError::validation("Invalid username or password."));
        }
        Ok(user)
    })
    .await??;

    let token = auth::issue_token(
        &user,
        &config.jwt_secret,
        Duration::hours(config.token_ttl_hours),
    )?;
    Ok(HttpResponse::Ok().json(TokenResponse { auth_token: token }))
}

#[get("/api/auth/me")]
pub async fn me(pool: web::Data<DbPool>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let response = web::block(move || -> Result<MeResponse, ApiError> {
        let mut conn = pool.get()?;
        let account = actions::get_user(&mut conn, user.id)?;
        let profile = actions::get_profile(&mut conn, user.id)?;
        Ok(MeResponse::from_parts(account, profile))
    })
    .await??;

    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_regex_accepts_word_characters_only() {
        let re = username_regex();
        assert!(re.is_match("alice_42"));
        assert!(!re.is_match("alice smith"));
        assert!(!re.is_match("alice@home"));
        assert!(!re.is_match(""));
    }
}
