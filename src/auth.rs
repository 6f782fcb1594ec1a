use actix_web::{web, HttpRequest, HttpResponse};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::category::seed_default_categories;
use crate::error::{ApiError, ApiResult};
use crate::models::new_id;
use crate::models::user::{
    ChangePasswordRequest, LoginRequest, Preferences, RefreshRequest, RegisterRequest,
    UpdateProfileRequest, User, UserProfile, UserRole,
};
use crate::tag::seed_default_tags;
use crate::validation::{
    validate_email, validate_login, validate_name, validate_password_change, validate_register,
};

const ACCESS_TOKEN_HOURS: i64 = 24;
const REFRESH_TOKEN_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub token: String,
    pub refresh_token: String,
}

pub fn create_jwt(user_id: &str, secret: &str, ttl: Duration) -> ApiResult<String> {
    let expiration = Utc::now() + ttl;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref()))
        .map_err(|e| ApiError::Unexpected(format!("token encoding: {}", e)))
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

fn issue_tokens(data: &AppState, user: &User) -> ApiResult<AuthResponse> {
    Ok(AuthResponse {
        id: user.id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        token: create_jwt(&user.id, &data.config.jwt_secret, Duration::hours(ACCESS_TOKEN_HOURS))?,
        refresh_token: create_jwt(
            &user.id,
            &data.config.refresh_token_secret,
            Duration::days(REFRESH_TOKEN_DAYS),
        )?,
    })
}

async fn hash_password(password: String, cost: u32) -> ApiResult<String> {
    Ok(web::block(move || hash(password, cost)).await??)
}

async fn password_matches(password: String, hashed: String) -> ApiResult<bool> {
    Ok(web::block(move || verify(password, &hashed)).await??)
}

async fn load_user(data: &AppState, id: &str) -> ApiResult<User> {
    data.store
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

/// POST /api/auth/register
pub async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    validate_register(&body.name, &body.email, &body.password)?;
    let email = body.email.trim().to_lowercase();
    debug!("Registering {}", email);

    if data.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: body.name.trim().to_string(),
        email,
        password: hash_password(body.password, data.config.bcrypt_cost).await?,
        avatar: None,
        role: UserRole::User,
        preferences: Preferences::default(),
        is_verified: false,
        last_active: now,
        created_at: now,
        updated_at: now,
    };
    data.store.insert_user(&user).await?;
    seed_default_categories(data.store.as_ref(), &user.id).await?;
    seed_default_tags(data.store.as_ref(), &user.id).await?;
    info!("User {} registered", user.id);

    Ok(api::created(issue_tokens(&data, &user)?))
}

/// POST /api/auth/login
pub async fn login(
    data: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    validate_login(&body.email, &body.password)?;
    let email = body.email.trim().to_lowercase();

    let invalid = || ApiError::Unauthorized("Invalid credentials".into());
    let mut user = data.store.find_user_by_email(&email).await?.ok_or_else(invalid)?;
    if !password_matches(body.password, user.password.clone()).await? {
        warn!("Failed login for {}", email);
        return Err(invalid());
    }

    user.last_active = Utc::now();
    data.store.replace_user(&user).await?;
    info!("User {} logged in", user.id);
    Ok(api::ok(issue_tokens(&data, &user)?))
}

/// POST /api/auth/refresh-token
pub async fn refresh_token(
    data: web::Data<AppState>,
    body: web::Json<RefreshRequest>,
) -> ApiResult<HttpResponse> {
    if body.refresh_token.is_empty() {
        return Err(ApiError::Validation("Refresh token is required".into()));
    }
    let claims = validate_jwt(&body.refresh_token, &data.config.refresh_token_secret)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired refresh token".into()))?;
    let user = load_user(&data, &claims.sub).await?;
    Ok(api::ok(issue_tokens(&data, &user)?))
}

/// GET /api/auth/me
pub async fn me(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let user_id = current_user(&req)?;
    let user = load_user(&data, &user_id).await?;
    Ok(api::ok(UserProfile::from(user)))
}

/// PUT /api/auth/me
pub async fn update_me(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = current_user(&req)?;
    let body = body.into_inner();
    let mut user = load_user(&data, &user_id).await?;

    if let Some(name) = body.name {
        validate_name(&name)?;
        user.name = name.trim().to_string();
    }
    if let Some(email) = body.email {
        let email = email.trim().to_lowercase();
        validate_email(&email)?;
        if email != user.email {
            if data.store.find_user_by_email(&email).await?.is_some() {
                return Err(ApiError::Conflict("Email is already in use".into()));
            }
            user.email = email;
        }
    }
    if let Some(preferences) = body.preferences {
        user.preferences.merge(preferences);
    }
    user.updated_at = Utc::now();

    data.store.replace_user(&user).await?;
    info!("User {} updated their profile", user.id);
    Ok(api::ok(UserProfile::from(user)))
}

/// PUT /api/auth/password
pub async fn change_password(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
) -> ApiResult<HttpResponse> {
    let user_id = current_user(&req)?;
    let body = body.into_inner();
    validate_password_change(&body.current_password, &body.new_password)?;

    let mut user = load_user(&data, &user_id).await?;
    if !password_matches(body.current_password, user.password.clone()).await? {
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }
    user.password = hash_password(body.new_password, data.config.bcrypt_cost).await?;
    user.updated_at = Utc::now();
    data.store.replace_user(&user).await?;
    info!("User {} changed their password", user.id);
    Ok(api::ok(serde_json::json!({ "message": "Password updated successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_their_subject() {
        let token = create_jwt("user-1", "secret", Duration::hours(1)).unwrap();
        let claims = validate_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(validate_jwt(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let token = create_jwt("user-1", "secret", Duration::hours(-2)).unwrap();
        assert!(validate_jwt(&token, "secret").is_err());
    }
}
