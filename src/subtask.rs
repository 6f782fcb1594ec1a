//! Routes under `/api/tasks/{id}/subtasks`. A subtask is an ordinary task
//! whose parent is `{id}`; these handlers scope the task operations to that
//! parent.

use actix_web::{web, HttpRequest, HttpResponse};

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::hierarchy;
use crate::models::task::{CreateTaskRequest, UpdateTaskRequest};
use crate::models::Task;
use crate::store::{Store, TaskFilter};

async fn subtask_of(
    store: &dyn Store,
    requester: &str,
    parent: &str,
    subtask: &str,
) -> ApiResult<Task> {
    let task = hierarchy::viewable_task(store, requester, subtask).await?;
    if task.parent.as_deref() != Some(parent) {
        return Err(ApiError::NotFound("Subtask not found".into()));
    }
    Ok(task)
}

/// GET /api/tasks/{id}/subtasks
pub async fn list_subtasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let parent = hierarchy::viewable_task(data.store.as_ref(), &requester, &path).await?;
    let subtasks = data.store.find_tasks(&TaskFilter::children_of(parent.id)).await?;
    Ok(api::list(subtasks))
}

/// POST /api/tasks/{id}/subtasks
pub async fn create_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CreateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let parent = hierarchy::viewable_task(data.store.as_ref(), &requester, &path).await?;
    let mut body = body.into_inner();
    body.parent = Some(parent.id);
    let subtask = hierarchy::create_task(data.store.as_ref(), &requester, body).await?;
    Ok(api::created(subtask))
}

/// GET /api/tasks/{id}/subtasks/status
pub async fn subtask_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let parent = hierarchy::viewable_task(data.store.as_ref(), &requester, &path).await?;
    let progress = hierarchy::subtask_progress(data.store.as_ref(), &parent.id).await?;
    Ok(api::ok(progress))
}

/// PATCH /api/tasks/{id}/subtasks/complete-all
pub async fn complete_all(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let subtasks =
        hierarchy::complete_all_subtasks(data.store.as_ref(), &requester, &path).await?;
    Ok(api::list(subtasks))
}

/// GET /api/tasks/{id}/subtasks/{subtask_id}
pub async fn get_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (parent, subtask) = path.into_inner();
    let task = subtask_of(data.store.as_ref(), &requester, &parent, &subtask).await?;
    Ok(api::ok(task))
}

/// PUT /api/tasks/{id}/subtasks/{subtask_id}
pub async fn update_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<UpdateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (parent, subtask) = path.into_inner();
    let task = subtask_of(data.store.as_ref(), &requester, &parent, &subtask).await?;
    let task =
        hierarchy::update_task(data.store.as_ref(), &requester, &task.id, body.into_inner())
            .await?;
    Ok(api::ok(task))
}

/// DELETE /api/tasks/{id}/subtasks/{subtask_id}
pub async fn delete_subtask(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (parent, subtask) = path.into_inner();
    let task = subtask_of(data.store.as_ref(), &requester, &parent, &subtask).await?;
    hierarchy::delete_task(data.store.as_ref(), &requester, &task.id, false).await?;
    Ok(api::empty())
}
