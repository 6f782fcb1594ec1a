use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Workflow status of a task. Transitions are unrestricted; only `Completed`
/// carries extra bookkeeping (`completed_at`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    #[default]
    Todo,
    InProgress,
    Review,
    Completed,
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Collaboration role of an assignee. Only `Responsible` grants write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssigneeRole {
    #[default]
    Responsible,
    Accountable,
    Consulted,
    Informed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignee {
    pub user: String,
    #[serde(default)]
    pub role: AssigneeRole,
}

/// A task document. Subtasks are not stored here: they are every task whose
/// `parent` equals this task's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::models::timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub owner: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub project: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub assignees: Vec<Assignee>,
    /// Minutes.
    #[serde(default)]
    pub estimated_time: u32,
    /// Minutes.
    #[serde(default)]
    pub actual_time: u32,
    #[serde(with = "crate::models::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::models::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_assignee(&self, user_id: &str) -> bool {
        self.assignees.iter().any(|a| a.user == user_id)
    }

    pub fn assignee_role(&self, user_id: &str) -> Option<AssigneeRole> {
        self.assignees
            .iter()
            .find(|a| a.user == user_id)
            .map(|a| a.role)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub project: Option<String>,
    pub parent: Option<String>,
    pub assignees: Option<Vec<Assignee>>,
    pub estimated_time: Option<u32>,
    pub actual_time: Option<u32>,
}

/// Field patch for a task. For nullable fields the outer `Option` says whether
/// the field was sent at all and the inner one carries an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub project: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent: Option<Option<String>>,
    pub assignees: Option<Vec<Assignee>>,
    pub estimated_time: Option<u32>,
    pub actual_time: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParentRequest {
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DuplicateTaskRequest {
    #[serde(default)]
    pub include_subtasks: bool,
}

/// Query-string filters for `GET /api/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubtaskProgress {
    pub total: u64,
    pub completed: u64,
    pub progress: u8,
}

/// A root task together with its eagerly loaded direct subtasks.
#[derive(Debug, Serialize)]
pub struct TaskWithSubtasks {
    #[serde(flatten)]
    pub task: Task,
    pub subtasks: Vec<Task>,
    pub progress: u8,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_missing_from_null() {
        let patch: UpdateTaskRequest =
            serde_json::from_str(r#"{"parent": null, "title": "x"}"#).unwrap();
        assert_eq!(patch.parent, Some(None));
        assert_eq!(patch.category, None);
        assert_eq!(patch.title.as_deref(), Some("x"));

        let patch: UpdateTaskRequest = serde_json::from_str(r#"{"parent": "p1"}"#).unwrap();
        assert_eq!(patch.parent, Some(Some("p1".to_string())));
    }

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let status: TaskStatus = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(status, TaskStatus::InProgress);
        assert_eq!(serde_json::to_string(&TaskStatus::Completed).unwrap(), r#""completed""#);
    }

    #[test]
    fn negative_durations_are_rejected() {
        let res: Result<CreateTaskRequest, _> =
            serde_json::from_str(r#"{"title": "t", "estimated_time": -5}"#);
        assert!(res.is_err());
    }
}
