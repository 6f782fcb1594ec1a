use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};

use crate::access::{can_delete_group, can_manage_members, is_manager_or_owner, is_member};
use crate::api::{self, current_user};
use crate::app_state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::membership::{add_member, change_role, expand_members, remove_member, seed_members_from};
use crate::models::group::{AddMemberRequest, ChangeRoleRequest};
use crate::models::project::CreateProjectRequest;
use crate::models::team::{CreateTeamRequest, UpdateTeamRequest};
use crate::models::{new_id, Member, MemberRole, Team};
use crate::project::{insert_project, new_project};
use crate::store::Write;

async fn load_team(data: &AppState, id: &str) -> ApiResult<Team> {
    data.store
        .find_team(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Team not found".into()))
}

async fn member_team(data: &AppState, requester: &str, id: &str) -> ApiResult<Team> {
    let team = load_team(data, id).await?;
    if !is_member(&team, requester) {
        return Err(ApiError::Forbidden("Not authorized to access this team".into()));
    }
    Ok(team)
}

async fn save_team(data: &AppState, mut team: Team) -> ApiResult<Team> {
    team.updated_at = Utc::now();
    data.store.commit(vec![Write::ReplaceTeam(team.clone())]).await?;
    Ok(team)
}

/// GET /api/teams
pub async fn list_teams(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let teams = data.store.find_teams_for_member(&requester).await?;
    Ok(api::list(teams))
}

/// POST /api/teams
pub async fn create_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<CreateTeamRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let body = body.into_inner();
    debug!("Received create_team request from {}: {:?}", requester, body);
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("Please add a team name".into()));
    }
    if data.store.find_team_by_name(&requester, &name).await?.is_some() {
        return Err(ApiError::Conflict("Team with that name already exists".into()));
    }

    let now = Utc::now();
    let team = Team {
        id: new_id(),
        name,
        description: body.description,
        avatar: body.avatar,
        owner: requester.clone(),
        members: vec![Member::new(requester.clone(), MemberRole::Owner)],
        is_private: body.is_private,
        created_at: now,
        updated_at: now,
    };
    data.store.insert_team(&team).await?;
    info!("Team {} created by {}", team.id, requester);
    Ok(api::created(team))
}

/// GET /api/teams/{id}
pub async fn get_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let mut team = member_team(&data, &requester, &path).await?;
    team.members = expand_members(data.store.as_ref(), &team.members).await?;
    Ok(api::ok(team))
}

/// PUT /api/teams/{id}
pub async fn update_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<UpdateTeamRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let body = body.into_inner();
    let mut team = load_team(&data, &path).await?;
    if !is_manager_or_owner(&team, &requester) {
        return Err(ApiError::Forbidden("Not authorized to update this team".into()));
    }

    if let Some(name) = body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if name != team.name {
            if data.store.find_team_by_name(&team.owner, &name).await?.is_some() {
                return Err(ApiError::Conflict("Team with that name already exists".into()));
            }
            team.name = name;
        }
    }
    if let Some(description) = body.description {
        team.description = Some(description);
    }
    if let Some(avatar) = body.avatar {
        team.avatar = Some(avatar);
    }
    if let Some(is_private) = body.is_private {
        team.is_private = is_private;
    }

    let team = save_team(&data, team).await?;
    info!("Team {} updated by {}", team.id, requester);
    Ok(api::ok(team))
}

/// DELETE /api/teams/{id}
///
/// Projects of the team are kept and lose their team reference.
pub async fn delete_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let team = load_team(&data, &path).await?;
    if !can_delete_group(&team, &requester) {
        return Err(ApiError::Forbidden("Only the team owner can delete this team".into()));
    }
    data.store
        .commit(vec![
            Write::DetachTeam(team.id.clone()),
            Write::DeleteTeam(team.id.clone()),
        ])
        .await?;
    info!("Team {} deleted by {}", team.id, requester);
    Ok(api::empty())
}

/// GET /api/teams/{id}/members
pub async fn get_team_members(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let team = member_team(&data, &requester, &path).await?;
    let members = expand_members(data.store.as_ref(), &team.members).await?;
    Ok(api::list(members))
}

/// POST /api/teams/{id}/members
pub async fn add_team_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<AddMemberRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let body = body.into_inner();
    let mut team = load_team(&data, &path).await?;
    if !can_manage_members(&team, &requester) {
        return Err(ApiError::Forbidden("Not authorized to add members to this team".into()));
    }
    let user = data
        .store
        .find_user_by_email(&body.email.trim().to_lowercase())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    add_member(&mut team, &user.id, body.role.unwrap_or_default())?;
    let mut team = save_team(&data, team).await?;
    info!("User {} added to team {}", user.id, team.id);
    team.members = expand_members(data.store.as_ref(), &team.members).await?;
    Ok(api::ok(team))
}

/// DELETE /api/teams/{id}/members/{user_id}
pub async fn remove_team_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (team_id, user_id) = path.into_inner();
    let mut team = load_team(&data, &team_id).await?;
    if !can_manage_members(&team, &requester) {
        return Err(ApiError::Forbidden(
            "Not authorized to remove members from this team".into(),
        ));
    }
    remove_member(&mut team, &user_id)?;
    let team = save_team(&data, team).await?;
    info!("User {} removed from team {}", user_id, team.id);
    Ok(api::ok(team))
}

/// PATCH /api/teams/{id}/members/{user_id}
pub async fn update_team_member_role(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<ChangeRoleRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let (team_id, user_id) = path.into_inner();
    let mut team = load_team(&data, &team_id).await?;
    change_role(&mut team, &requester, &user_id, body.role)?;
    let team = save_team(&data, team).await?;
    info!("User {} is now {:?} of team {}", user_id, body.role, team.id);
    Ok(api::ok(team))
}

/// GET /api/teams/{id}/projects
pub async fn get_team_projects(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let team = member_team(&data, &requester, &path).await?;
    let projects = data.store.find_projects_by_team(&team.id).await?;
    Ok(api::list(projects))
}

/// POST /api/teams/{id}/projects
///
/// The project starts with the team's members; the creator owns it.
pub async fn create_team_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<CreateProjectRequest>,
) -> ApiResult<HttpResponse> {
    let requester = current_user(&req)?;
    let team = load_team(&data, &path).await?;
    if !is_manager_or_owner(&team, &requester) {
        return Err(ApiError::Forbidden(
            "Not authorized to create projects for this team".into(),
        ));
    }
    let members = seed_members_from(&team, &requester);
    let project = new_project(&requester, body.into_inner(), Some(team.id.clone()), members)?;
    insert_project(data.store.as_ref(), &project).await?;
    Ok(api::created(project))
}
