//! Authorization predicates. Everything here works on documents the caller
//! has already loaded; nothing touches the store.

use crate::models::{AssigneeRole, Group, MemberRole, Owned, Project, Task};

pub fn is_owner(entity: &impl Owned, user_id: &str) -> bool {
    entity.owner_id() == user_id
}

pub fn member_role(group: &impl Group, user_id: &str) -> Option<MemberRole> {
    group
        .members()
        .iter()
        .find(|m| m.user.id() == user_id)
        .map(|m| m.role)
}

/// Membership by underlying user id, whether the member entry holds a bare
/// id or an expanded user summary.
pub fn is_member(group: &impl Group, user_id: &str) -> bool {
    member_role(group, user_id).is_some()
}

pub fn is_manager_or_owner(group: &impl Group, user_id: &str) -> bool {
    matches!(
        member_role(group, user_id),
        Some(MemberRole::Owner | MemberRole::Admin)
    )
}

/// `project` must be the task's project when it has one.
pub fn can_view_task(task: &Task, project: Option<&Project>, user_id: &str) -> bool {
    is_owner(task, user_id)
        || task.is_assignee(user_id)
        || project.map_or(false, |p| is_member(p, user_id))
}

pub fn can_modify_task(task: &Task, project: Option<&Project>, user_id: &str) -> bool {
    is_owner(task, user_id)
        || task.assignee_role(user_id) == Some(AssigneeRole::Responsible)
        || project.map_or(false, |p| is_manager_or_owner(p, user_id))
}

pub fn can_manage_members(group: &impl Group, user_id: &str) -> bool {
    is_manager_or_owner(group, user_id)
}

pub fn can_delete_group(group: &impl Group, user_id: &str) -> bool {
    group.owner() == user_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::fixtures;
    use crate::models::{Assignee, Member, UserRef, UserSummary};

    fn expanded(id: &str) -> UserRef {
        UserRef::Expanded(UserSummary {
            id: id.to_string(),
            name: "Someone".to_string(),
            email: format!("{}@example.com", id),
            avatar: None,
        })
    }

    #[test]
    fn membership_ignores_reference_shape() {
        let mut bare = fixtures::project("owner", "Bare");
        bare.members.push(Member::new("u2", MemberRole::Admin));

        let mut rich = bare.clone();
        for member in rich.members.iter_mut() {
            member.user = expanded(member.user.id());
        }

        for user in ["owner", "u2", "stranger"] {
            assert_eq!(is_member(&bare, user), is_member(&rich, user));
            assert_eq!(is_manager_or_owner(&bare, user), is_manager_or_owner(&rich, user));
        }
        assert!(is_member(&rich, "u2"));
        assert!(!is_member(&rich, "stranger"));
    }

    #[test]
    fn plain_members_cannot_manage() {
        let mut project = fixtures::project("owner", "P");
        project.members.push(Member::new("m", MemberRole::Member));
        project.members.push(Member::new("a", MemberRole::Admin));

        assert!(can_manage_members(&project, "owner"));
        assert!(can_manage_members(&project, "a"));
        assert!(!can_manage_members(&project, "m"));
        assert!(can_delete_group(&project, "owner"));
        assert!(!can_delete_group(&project, "a"));
    }

    #[test]
    fn only_responsible_assignees_may_modify() {
        let mut task = fixtures::task("owner", "T", None);
        task.assignees = vec![
            Assignee { user: "r".into(), role: AssigneeRole::Responsible },
            Assignee { user: "i".into(), role: AssigneeRole::Informed },
        ];

        assert!(can_view_task(&task, None, "i"));
        assert!(can_modify_task(&task, None, "r"));
        assert!(!can_modify_task(&task, None, "i"));
        assert!(!can_view_task(&task, None, "stranger"));
    }

    #[test]
    fn project_role_gates_task_access() {
        let mut project = fixtures::project("lead", "P");
        project.members.push(Member::new("m", MemberRole::Member));
        let mut task = fixtures::task("owner", "T", None);
        task.project = Some(project.id.clone());

        assert!(can_view_task(&task, Some(&project), "m"));
        assert!(!can_modify_task(&task, Some(&project), "m"));
        assert!(can_modify_task(&task, Some(&project), "lead"));
    }
}
