// src/project.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};

use crate::access::{can_delete_group, can_manage_members, is_manager_or_owner, is_member};
use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::membership::{add_member, change_role, expand_members, remove_member};
use crate::models::group::{AddMemberRequest, ChangeRoleRequest};
use crate::models::project::{CreateProjectRequest, UpdateProjectRequest};
use crate::models::taxonomy::DEFAULT_COLOR;
use crate::models::{new_id, Member, MemberRole, Project};
use crate::store::{Store, TaskFilter, Write};

pub const DEFAULT_PROJECT_ICON: &str = "briefcase";

/// A fresh project owned by `owner`, with `members` as given. Callers
/// ensure `owner` is the single `Owner` entry.
pub fn new_project(
    owner: &str,
    body: CreateProjectRequest,
    team: Option<String>,
    members: Vec<Member>,
) -> ApiResult<Project> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Please add a project name".into()));
    }
    let now = Utc::now();
    Ok(Project {
        id: new_id(),
        name,
        description: body.description,
        color: body.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
        icon: body.icon.unwrap_or_else(|| DEFAULT_PROJECT_ICON.to_string()),
        start_date: body.start_date,
        end_date: body.end_date,
        status: Default::default(),
        owner: owner.to_string(),
        team,
        members,
        is_private: body.is_private,
        created_at: now,
        updated_at: now,
    })
}

/// Insert after checking the (name, owner) constraint.
pub async fn insert_project(store: &dyn Store, project: &Project) -> ApiResult<()> {
    if store
        .find_project_by_name(&project.owner, &project.name)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Project with that name already exists".into()));
    }
    store.insert_project(project).await?;
    info!("Project {} created by {}", project.id, project.owner);
    Ok(())
}

async fn load_project(data: &AppState, id: &str) -> ApiResult<Project> {
    data.store
        .find_project(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))
}

async fn member_project(data: &AppState, requester: &str, id: &str) -> ApiResult<Project> {
    let project = load_project(data, id).await?;
    if !is_member(&project, requester) {
        return Err(ApiError::Forbidden("Not authorized to access this project".into()));
    }
    Ok(project)
}

async fn save_project(data: &AppState, mut project: Project) -> ApiResult<Project> {
    project.updated_at = Utc::now();
    data.store
        .commit(vec![Write::ReplaceProject(project.clone())])
        .await?;
    Ok(project)
}

/// GET /api/projects
pub async fn list_projects(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let projects = data.store.find_projects_for_member(&requester).await?;
    Ok(api::list(projects))
}

/// POST /api/projects
pub async fn create_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateProjectRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    debug!("Received create_project request from {}: {:?}", requester, body);
    let members = vec![Member::new(requester.clone(), MemberRole::Owner)];
    let project = new_project(&requester, body.into_inner(), None, members)?;
    insert_project(data.store.as_ref(), &project).await?;
    Ok(api::created(project))
}

/// GET /api/projects/{id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let mut project = member_project(&data, &requester, &path).await?;
    project.members = expand_members(data.store.as_ref(), &project.members).await?;
    Ok(api::ok(project))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateProjectRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let body = body.into_inner();
    let mut project = load_project(&data, &path).await?;
    if !is_manager_or_owner(&project, &requester) {
        return Err(ApiError::Forbidden("Not authorized to update this project".into()));
    }

    if let Some(name) = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if name != project.name {
            if data
                .store
                .find_project_by_name(&project.owner, &name)
                .await?
                .is_some()
            {
                return Err(ApiError::Conflict("Project with that name already exists".into()));
            }
            project.name = name;
        }
    }
    if let Some(description) = body.description {
        project.description = Some(description);
    }
    if let Some(color) = body.color {
        project.color = color;
    }
    if let Some(icon) = body.icon {
        project.icon = icon;
    }
    if let Some(start_date) = body.start_date {
        project.start_date = Some(start_date);
    }
    if let Some(end_date) = body.end_date {
        project.end_date = Some(end_date);
    }
    if let Some(status) = body.status {
        project.status = status;
    }
    if let Some(is_private) = body.is_private {
        project.is_private = is_private;
    }

    let project = save_project(&data, project).await?;
    info!("Project {} updated by {}", project.id, requester);
    Ok(api::ok(project))
}

/// DELETE /api/projects/{id}
///
/// The project's tasks survive without a project.
pub async fn delete_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let project = load_project(&data, &path).await?;
    if !can_delete_group(&project, &requester) {
        return Err(ApiError::Forbidden(
            "Only the project owner can delete this project".into(),
        ));
    }
    data.store
        .commit(vec![
            Write::DetachProject(project.id.clone()),
            Write::DeleteProject(project.id.clone()),
        ])
        .await?;
    info!("Project {} deleted by {}", project.id, requester);
    Ok(api::empty())
}

/// GET /api/projects/{id}/tasks
pub async fn project_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let project = member_project(&data, &requester, &path).await?;
    let mut tasks = data
        .store
        .find_tasks(&TaskFilter::in_project(project.id))
        .await?;
    tasks.reverse();
    Ok(api::list(tasks))
}

/// POST /api/projects/{id}/members
pub async fn add_project_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AddMemberRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let body = body.into_inner();
    let mut project = load_project(&data, &path).await?;
    if !can_manage_members(&project, &requester) {
        return Err(ApiError::Forbidden(
            "Not authorized to add members to this project".into(),
        ));
    }
    let user = data
        .store
        .find_user_by_email(&body.email.trim().to_lowercase())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    add_member(&mut project, &user.id, body.role.unwrap_or_default())?;
    let mut project = save_project(&data, project).await?;
    info!("User {} added to project {}", user.id, project.id);
    project.members = expand_members(data.store.as_ref(), &project.members).await?;
    Ok(api::ok(project))
}

/// DELETE /api/projects/{id}/members/{user_id}
pub async fn remove_project_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (project_id, user_id) = path.into_inner();
    let mut project = load_project(&data, &project_id).await?;
    if !can_manage_members(&project, &requester) {
        return Err(ApiError::Forbidden(
            "Not authorized to remove members from this project".into(),
        ));
    }
    remove_member(&mut project, &user_id)?;
    let project = save_project(&data, project).await?;
    info!("User {} removed from project {}", user_id, project.id);
    Ok(api::ok(project))
}

/// PATCH /api/projects/{id}/members/{user_id}
pub async fn update_project_member_role(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ChangeRoleRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (project_id, user_id) = path.into_inner();
    let mut project = load_project(&data, &project_id).await?;
    change_role(&mut project, &requester, &user_id, body.role)?;
    let project = save_project(&data, project).await?;
    info!("User {} is now {:?} of project {}", user_id, body.role, project.id);
    Ok(api::ok(project))
}
