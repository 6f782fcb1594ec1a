use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    #[default]
    Member,
}

/// A member's user reference as stored (bare id) or as returned to clients
/// after expansion (user summary). Both resolve to the same identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Expanded(UserSummary),
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Expanded(user) => &user.id,
        }
    }
}

impl From<String> for UserRef {
    fn from(id: String) -> Self {
        UserRef::Id(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: UserRef,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(with = "crate::models::timestamp")]
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(user_id: impl Into<String>, role: MemberRole) -> Self {
        Self {
            user: UserRef::Id(user_id.into()),
            role,
            joined_at: Utc::now(),
        }
    }
}

/// Shared shape of projects and teams: an owner field kept in sync with the
/// single `Owner` entry of an ordered members list.
pub trait Group {
    fn owner(&self) -> &str;
    fn set_owner(&mut self, user_id: String);
    fn members(&self) -> &[Member];
    fn members_mut(&mut self) -> &mut Vec<Member>;
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    #[serde(default)]
    pub role: Option<MemberRole>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: MemberRole,
}
