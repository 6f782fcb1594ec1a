//! Response envelopes and request helpers shared by every handler module.

use actix_web::{HttpMessage, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};

/// Id of the authenticated caller, inserted by the `Authentication`
/// middleware once the bearer token checks out.
#[derive(Debug, Clone)]
pub struct Requester(pub String);

pub fn current_user(req: &HttpRequest) -> ApiResult<String> {
    req.extensions()
        .get::<Requester>()
        .map(|r| r.0.clone())
        .ok_or_else(|| ApiError::Unauthorized("Not authorized, no token".into()))
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

pub fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data }))
}

pub fn list<T: Serialize>(items: Vec<T>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "count": items.len(),
        "data": items,
    }))
}

/// Acknowledgement for deletes.
pub fn empty() -> HttpResponse {
    ok(json!({}))
}
