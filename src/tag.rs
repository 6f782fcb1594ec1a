use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::new_id;
use crate::models::taxonomy::{TagRequest, DEFAULT_COLOR};
use crate::models::Tag;
use crate::store::{Store, StoreResult, TaskFilter, Write};

const DEFAULT_TAGS: [(&str, &str); 5] = [
    ("Important", "#e74c3c"),
    ("Urgent", "#f39c12"),
    ("Later", "#3498db"),
    ("Quick Win", "#2ecc71"),
    ("Waiting", "#9b59b6"),
];

pub async fn seed_default_tags(store: &dyn Store, owner: &str) -> StoreResult<()> {
    let now = Utc::now();
    let tags: Vec<Tag> = DEFAULT_TAGS
        .iter()
        .map(|(name, color)| Tag {
            id: new_id(),
            name: name.to_string(),
            color: color.to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
        })
        .collect();
    store.insert_tags(&tags).await
}

async fn own_tag(data: &AppState, owner: &str, id: &str) -> ApiResult<Tag> {
    match data.store.find_tag(id).await? {
        Some(tag) if tag.owner == owner => Ok(tag),
        _ => Err(ApiError::NotFound("Tag not found".into())),
    }
}

/// GET /api/tags
pub async fn list_tags(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    Ok(api::list(data.store.find_tags(&owner).await?))
}

/// POST /api/tags
pub async fn create_tag(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<TagRequest>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let body = body.into_inner();
    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Please add a tag name".into()))?;

    if data.store.find_tag_by_name(&owner, &name).await?.is_some() {
        return Err(ApiError::Conflict("Tag already exists".into()));
    }
    let now = Utc::now();
    let tag = Tag {
        id: new_id(),
        name,
        color: body.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        owner,
        created_at: now,
        updated_at: now,
    };
    data.store.insert_tags(std::slice::from_ref(&tag)).await?;
    info!("Tag {} created", tag.id);
    Ok(api::created(tag))
}

/// GET /api/tags/{id}
pub async fn get_tag(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    Ok(api::ok(own_tag(&data, &owner, &path).await?))
}

/// PUT /api/tags/{id}
pub async fn update_tag(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<TagRequest>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let body = body.into_inner();
    let mut tag = own_tag(&data, &owner, &path).await?;

    if let Some(name) = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if name != tag.name {
            if data.store.find_tag_by_name(&owner, &name).await?.is_some() {
                return Err(ApiError::Conflict("Tag with this name already exists".into()));
            }
            tag.name = name;
        }
    }
    if let Some(color) = body.color {
        tag.color = color;
    }
    tag.updated_at = Utc::now();

    data.store.replace_tag(&tag).await?;
    Ok(api::ok(tag))
}

/// DELETE /api/tags/{id}
pub async fn delete_tag(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let tag = own_tag(&data, &owner, &path).await?;
    data.store
        .commit(vec![Write::PullTag(tag.id.clone()), Write::DeleteTag(tag.id.clone())])
        .await?;
    info!("Tag {} deleted", tag.id);
    Ok(api::empty())
}

/// GET /api/tags/{id}/tasks
pub async fn tag_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let tag = own_tag(&data, &owner, &path).await?;
    let filter = TaskFilter {
        tag: Some(tag.id),
        ..TaskFilter::owned_by(owner)
    };
    let mut tasks = data.store.find_tasks(&filter).await?;
    tasks.reverse();
    Ok(api::list(tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    #[tokio::test]
    async fn seeding_twice_hits_the_name_constraint() {
        let store = MemoryStore::new();
        seed_default_tags(&store, "u1").await.unwrap();
        assert_eq!(store.find_tags("u1").await.unwrap().len(), 5);
        assert!(seed_default_tags(&store, "u1").await.is_err());
    }
}
