//! Persistence seam. Handlers and the core engines only ever talk to
//! `dyn Store`; `db::MongoDB` and `memory_store::MemoryStore` implement it.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Category, Project, Tag, Task, TaskStatus, Team, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),
    /// A unique index (email, or name per owner) rejected the write.
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("document not found: {0}")]
    Missing(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Equality and set-membership predicates over tasks. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub owner: Option<String>,
    /// Matches tasks whose parent is any of these ids.
    pub parents: Option<Vec<String>>,
    /// Matches tasks with no parent.
    pub roots_only: bool,
    pub project: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskFilter {
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            ..Self::default()
        }
    }

    pub fn children_of(parent: impl Into<String>) -> Self {
        Self::children_of_any(vec![parent.into()])
    }

    pub fn children_of_any(parents: Vec<String>) -> Self {
        Self {
            parents: Some(parents),
            ..Self::default()
        }
    }

    pub fn in_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn roots(mut self) -> Self {
        self.roots_only = true;
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(owner) = &self.owner {
            if &task.owner != owner {
                return false;
            }
        }
        if let Some(parents) = &self.parents {
            match &task.parent {
                Some(parent) if parents.contains(parent) => {}
                _ => return false,
            }
        }
        if self.roots_only && task.parent.is_some() {
            return false;
        }
        if self.project.is_some() && task.project != self.project {
            return false;
        }
        if self.category.is_some() && task.category != self.category {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !task.tags.contains(tag) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        true
    }
}

/// One step of an atomic multi-document write. A `Vec<Write>` passed to
/// [`Store::commit`] is applied all-or-nothing, in order.
#[derive(Debug, Clone)]
pub enum Write {
    InsertTasks(Vec<Task>),
    ReplaceTask(Task),
    DeleteTasks(Vec<String>),
    /// Null out `category` on every task that references it.
    DetachCategory(String),
    DeleteCategory(String),
    /// Pull the tag id out of every task's `tags`.
    PullTag(String),
    DeleteTag(String),
    ReplaceProject(Project),
    /// Null out `project` on every task that references it.
    DetachProject(String),
    DeleteProject(String),
    ReplaceTeam(Team),
    /// Null out `team` on every project that references it.
    DetachTeam(String),
    DeleteTeam(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn replace_user(&self, user: &User) -> StoreResult<()>;

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>>;
    /// Matching tasks, oldest first.
    async fn find_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;
    async fn count_tasks(&self, filter: &TaskFilter) -> StoreResult<u64>;
    async fn insert_task(&self, task: &Task) -> StoreResult<()>;
    async fn replace_task(&self, task: &Task) -> StoreResult<()>;

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>>;
    /// The owner's categories sorted by name.
    async fn find_categories(&self, owner: &str) -> StoreResult<Vec<Category>>;
    async fn find_category_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Category>>;
    async fn insert_categories(&self, categories: &[Category]) -> StoreResult<()>;
    async fn replace_category(&self, category: &Category) -> StoreResult<()>;

    async fn find_tag(&self, id: &str) -> StoreResult<Option<Tag>>;
    /// The owner's tags sorted by name.
    async fn find_tags(&self, owner: &str) -> StoreResult<Vec<Tag>>;
    async fn find_tag_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Tag>>;
    async fn insert_tags(&self, tags: &[Tag]) -> StoreResult<()>;
    async fn replace_tag(&self, tag: &Tag) -> StoreResult<()>;

    async fn find_project(&self, id: &str) -> StoreResult<Option<Project>>;
    /// Projects listing the user as a member, most recently updated first.
    async fn find_projects_for_member(&self, user_id: &str) -> StoreResult<Vec<Project>>;
    async fn find_projects_by_team(&self, team_id: &str) -> StoreResult<Vec<Project>>;
    async fn find_project_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Project>>;
    async fn insert_project(&self, project: &Project) -> StoreResult<()>;

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>>;
    /// Teams listing the user as a member, most recently updated first.
    async fn find_teams_for_member(&self, user_id: &str) -> StoreResult<Vec<Team>>;
    async fn find_team_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Team>>;
    async fn insert_team(&self, team: &Team) -> StoreResult<()>;

    /// Apply every write in one transaction. On failure nothing is applied
    /// and the first error is returned.
    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()>;
}
