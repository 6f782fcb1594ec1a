//! Document models shared by the store backends and the HTTP handlers.
//!
//! Every document keys on a UUID string stored as `_id`; cross-document
//! references (owner, parent, project, team, category, tags) are plain ids.

pub mod group;
pub mod project;
pub mod task;
pub mod taxonomy;
pub mod team;
pub mod timestamp;
pub mod user;

pub use group::{Group, Member, MemberRole, UserRef};
pub use project::Project;
pub use task::{Assignee, AssigneeRole, Task, TaskPriority, TaskStatus};
pub use taxonomy::{Category, Tag};
pub use team::Team;
pub use user::{User, UserSummary};

/// Anything with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> &str;
}

impl Owned for Task {
    fn owner_id(&self) -> &str {
        &self.owner
    }
}

impl Owned for Category {
    fn owner_id(&self) -> &str {
        &self.owner
    }
}

impl Owned for Tag {
    fn owner_id(&self) -> &str {
        &self.owner
    }
}

impl Owned for Project {
    fn owner_id(&self) -> &str {
        &self.owner
    }
}

impl Owned for Team {
    fn owner_id(&self) -> &str {
        &self.owner
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
