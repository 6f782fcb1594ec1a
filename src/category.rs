use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::new_id;
use crate::models::taxonomy::{CategoryRequest, DEFAULT_CATEGORY_ICON, DEFAULT_COLOR};
use crate::models::Category;
use crate::store::{Store, StoreResult, TaskFilter, Write};

/// (name, color, icon) of the categories every new account starts with.
const DEFAULT_CATEGORIES: [(&str, &str, &str); 5] = [
    ("Work", "#e74c3c", "briefcase"),
    ("Personal", "#3498db", "user"),
    ("Health", "#2ecc71", "heart"),
    ("Finance", "#f39c12", "dollar-sign"),
    ("Education", "#9b59b6", "book"),
];

pub async fn seed_default_categories(store: &dyn Store, owner: &str) -> StoreResult<()> {
    let now = Utc::now();
    let categories: Vec<Category> = DEFAULT_CATEGORIES
        .iter()
        .map(|(name, color, icon)| Category {
            id: new_id(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            owner: owner.to_string(),
            is_default: true,
            created_at: now,
            updated_at: now,
        })
        .collect();
    store.insert_categories(&categories).await
}

/// Another user's category is reported as missing.
async fn own_category(data: &AppState, owner: &str, id: &str) -> ApiResult<Category> {
    match data.store.find_category(id).await? {
        Some(category) if category.owner == owner => Ok(category),
        _ => Err(ApiError::NotFound("Category not found".into())),
    }
}

/// GET /api/categories
pub async fn list_categories(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let categories = data.store.find_categories(&owner).await?;
    Ok(api::list(categories))
}

/// POST /api/categories
pub async fn create_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CategoryRequest>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let body = body.into_inner();
    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Please add a category name".into()))?;
    debug!("Creating category {} for {}", name, owner);

    if data.store.find_category_by_name(&owner, &name).await?.is_some() {
        return Err(ApiError::Conflict("Category already exists".into()));
    }
    let now = Utc::now();
    let category = Category {
        id: new_id(),
        name,
        color: body.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        icon: body.icon.unwrap_or_else(|| DEFAULT_CATEGORY_ICON.to_string()),
        owner,
        is_default: false,
        created_at: now,
        updated_at: now,
    };
    data.store.insert_categories(std::slice::from_ref(&category)).await?;
    info!("Category {} created", category.id);
    Ok(api::created(category))
}

/// GET /api/categories/{id}
pub async fn get_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let category = own_category(&data, &owner, &path).await?;
    Ok(api::ok(category))
}

/// PUT /api/categories/{id}
pub async fn update_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CategoryRequest>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let body = body.into_inner();
    let mut category = own_category(&data, &owner, &path).await?;

    if let Some(name) = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if name != category.name {
            if data.store.find_category_by_name(&owner, &name).await?.is_some() {
                return Err(ApiError::Conflict("Category with this name already exists".into()));
            }
            category.name = name;
        }
    }
    if let Some(color) = body.color {
        category.color = color;
    }
    if let Some(icon) = body.icon {
        category.icon = icon;
    }
    category.updated_at = Utc::now();

    data.store.replace_category(&category).await?;
    info!("Category {} updated", category.id);
    Ok(api::ok(category))
}

/// DELETE /api/categories/{id}
///
/// Tasks in the category keep existing with no category.
pub async fn delete_category(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let category = own_category(&data, &owner, &path).await?;
    if category.is_default {
        return Err(ApiError::Conflict("Cannot delete default category".into()));
    }
    data.store
        .commit(vec![
            Write::DetachCategory(category.id.clone()),
            Write::DeleteCategory(category.id.clone()),
        ])
        .await?;
    info!("Category {} deleted", category.id);
    Ok(api::empty())
}

/// GET /api/categories/{id}/tasks
pub async fn category_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let category = own_category(&data, &owner, &path).await?;
    let filter = TaskFilter {
        category: Some(category.id),
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
    async fn seeds_five_default_categories() {
        let store = MemoryStore::new();
        seed_default_categories(&store, "u1").await.unwrap();

        let categories = store.find_categories("u1").await.unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Education", "Finance", "Health", "Personal", "Work"]);
        assert!(categories.iter().all(|c| c.is_default));
        assert!(store.find_categories("u2").await.unwrap().is_empty());
    }
}
