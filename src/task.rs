use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde_json::json;

use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::ApiResult;
use crate::hierarchy;
use crate::models::task::{
    CreateTaskRequest, DuplicateTaskRequest, TaskQuery, TaskWithSubtasks, UpdateParentRequest,
    UpdateStatusRequest, UpdateTaskRequest,
};
use crate::models::Task;
use crate::store::TaskFilter;

/// GET /api/tasks
///
/// The caller's own tasks, newest first.
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let query = query.into_inner();
    debug!("Listing tasks for {} with {:?}", owner, query);
    let filter = TaskFilter {
        status: query.status,
        category: query.category,
        tag: query.tag,
        project: query.project,
        ..TaskFilter::owned_by(owner)
    };
    let mut tasks = data.store.find_tasks(&filter).await?;
    tasks.reverse();
    Ok(api::list(tasks))
}

/// POST /api/tasks
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let task = hierarchy::create_task(data.store.as_ref(), &owner, body.into_inner()).await?;
    Ok(api::created(task))
}

/// GET /api/tasks/with-subtasks
///
/// Root tasks with their direct subtasks loaded in one extra query.
pub async fn tasks_with_subtasks(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let owner = current_user(&req)?;
    let roots = data
        .store
        .find_tasks(&TaskFilter::owned_by(owner).roots())
        .await?;
    let root_ids = roots.iter().map(|t| t.id.clone()).collect();
    let children = data
        .store
        .find_tasks(&TaskFilter::children_of_any(root_ids))
        .await?;

    let mut by_parent: HashMap<String, Vec<Task>> = HashMap::new();
    for child in children {
        if let Some(parent) = child.parent.clone() {
            by_parent.entry(parent).or_default().push(child);
        }
    }
    let tasks: Vec<TaskWithSubtasks> = roots
        .into_iter()
        .rev()
        .map(|task| {
            let subtasks = by_parent.remove(&task.id).unwrap_or_default();
            let progress = hierarchy::progress_of(&subtasks);
            TaskWithSubtasks { task, subtasks, progress }
        })
        .collect();
    Ok(api::list(tasks))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let task = hierarchy::viewable_task(data.store.as_ref(), &requester, &path).await?;
    Ok(api::ok(task))
}

/// PUT /api/tasks/{id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let task =
        hierarchy::update_task(data.store.as_ref(), &requester, &path, body.into_inner()).await?;
    Ok(api::ok(task))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    hierarchy::delete_task(data.store.as_ref(), &requester, &path, false).await?;
    Ok(api::empty())
}

/// DELETE /api/tasks/{id}/with-subtasks
pub async fn delete_task_with_subtasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let deleted = hierarchy::delete_task(data.store.as_ref(), &requester, &path, true).await?;
    Ok(api::ok(json!({ "deleted": deleted })))
}

/// POST /api/tasks/{id}/duplicate
///
/// Responds with the root copy; `copies` counts every task created.
pub async fn duplicate_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<DuplicateTaskRequest>>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let include_subtasks = body.map_or(false, |b| b.include_subtasks);
    let copies =
        hierarchy::duplicate_task(data.store.as_ref(), &requester, &path, include_subtasks).await?;
    let count = copies.len();
    let root = copies.into_iter().next();
    Ok(api::created(json!({ "task": root, "copies": count })))
}

/// PATCH /api/tasks/{id}/status
pub async fn update_status(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let task = hierarchy::set_status(data.store.as_ref(), &requester, &path, body.status).await?;
    Ok(api::ok(task))
}

/// PATCH /api/tasks/{id}/parent
pub async fn update_parent(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateParentRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let task = hierarchy::reparent(
        data.store.as_ref(),
        &requester,
        &path,
        body.parent.as_deref(),
    )
    .await?;
    Ok(api::ok(task))
}

/// POST /api/tasks/{id}/archive
pub async fn archive_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let task = hierarchy::archive_task(data.store.as_ref(), &requester, &path).await?;
    Ok(api::ok(task))
}
