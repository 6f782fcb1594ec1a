use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde::Deserialize;

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::UserSummary;

#[derive(Debug, Deserialize)]
pub struct FindUserQuery {
    pub email: String,
}

/// GET /api/users/find?email=
///
/// Exact (case-insensitive) match, used to look people up before adding
/// them to a project or team.
pub async fn find_user_email(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<FindUserQuery>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let email = query.email.trim().to_lowercase();
    debug!("User {} looking up {}", requester, email);
    let user = data
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(api::ok(UserSummary::from(&user)))
}

/// GET /api/users/{id}
pub async fn get_user_by_id(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    current_user(&req)?;
    let user = data
        .store
        .find_user(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(api::ok(UserSummary::from(&user)))
}
