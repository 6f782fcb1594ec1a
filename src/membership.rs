//! Member-list bookkeeping shared by projects and teams. These functions
//! mutate a loaded group in place; callers persist the result with a single
//! `Write::ReplaceProject` / `Write::ReplaceTeam`.

use chrono::Utc;

use crate::access::{can_manage_members, is_member};
use crate::error::{ApiError, ApiResult};
use crate::models::{Group, Member, MemberRole, UserRef, UserSummary};
use crate::store::Store;

pub fn add_member(group: &mut impl Group, user_id: &str, role: MemberRole) -> ApiResult<()> {
    if role == MemberRole::Owner {
        return Err(ApiError::Validation(
            "Ownership can only be transferred by changing a member's role".into(),
        ));
    }
    if is_member(group, user_id) {
        return Err(ApiError::Conflict("User is already a member".into()));
    }
    group.members_mut().push(Member::new(user_id, role));
    Ok(())
}

pub fn remove_member(group: &mut impl Group, user_id: &str) -> ApiResult<()> {
    if group.owner() == user_id {
        return Err(ApiError::Conflict("Cannot remove the owner".into()));
    }
    let members = group.members_mut();
    let Some(index) = members.iter().position(|m| m.user.id() == user_id) else {
        return Err(ApiError::NotFound("User is not a member".into()));
    };
    members.remove(index);
    Ok(())
}

/// Change `target`'s role on behalf of `requester`. Promoting to owner moves
/// ownership: the previous owner becomes an admin and the group's `owner`
/// field follows the new owner, so exactly one owner remains.
pub fn change_role(
    group: &mut impl Group,
    requester: &str,
    target: &str,
    role: MemberRole,
) -> ApiResult<()> {
    if !can_manage_members(group, requester) {
        return Err(ApiError::Forbidden("Not authorized to change member roles".into()));
    }
    if !is_member(group, target) {
        return Err(ApiError::NotFound("User is not a member".into()));
    }
    let current_owner = group.owner().to_string();

    if role != MemberRole::Owner {
        if target == current_owner {
            return Err(ApiError::Conflict("Cannot demote the owner".into()));
        }
        set_role(group, target, role);
        return Ok(());
    }

    if requester != current_owner {
        return Err(ApiError::Forbidden("Only the owner can transfer ownership".into()));
    }
    if target == current_owner {
        return Ok(());
    }
    set_role(group, &current_owner, MemberRole::Admin);
    set_role(group, target, MemberRole::Owner);
    group.set_owner(target.to_string());
    Ok(())
}

/// Members for a project created under `team`: the team's members in order,
/// with `creator` as the single owner and the team's owner demoted to admin.
pub fn seed_members_from(team: &impl Group, creator: &str) -> Vec<Member> {
    let now = Utc::now();
    let mut members: Vec<Member> = team
        .members()
        .iter()
        .map(|m| {
            let role = if m.user.id() == creator {
                MemberRole::Owner
            } else if m.role == MemberRole::Owner {
                MemberRole::Admin
            } else {
                m.role
            };
            Member {
                user: m.user.id().to_string().into(),
                role,
                joined_at: now,
            }
        })
        .collect();
    if !members.iter().any(|m| m.user.id() == creator) {
        members.insert(0, Member::new(creator, MemberRole::Owner));
    }
    members
}

/// Replace bare member ids with user summaries for responses. Members whose
/// user no longer exists keep their bare id.
pub async fn expand_members(store: &dyn Store, members: &[Member]) -> ApiResult<Vec<Member>> {
    let ids: Vec<String> = members.iter().map(|m| m.user.id().to_string()).collect();
    let users = store.find_users(&ids).await?;
    Ok(members
        .iter()
        .map(|m| {
            let user = users
                .iter()
                .find(|u| u.id == m.user.id())
                .map(|u| UserRef::Expanded(UserSummary::from(u)))
                .unwrap_or_else(|| m.user.clone());
            Member { user, ..m.clone() }
        })
        .collect())
}

fn set_role(group: &mut impl Group, user_id: &str, role: MemberRole) {
    if let Some(member) = group.members_mut().iter_mut().find(|m| m.user.id() == user_id) {
        member.role = role;
    }
}
