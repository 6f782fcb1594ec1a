//! The task tree: parent assignment with cycle prevention, cascading delete,
//! subtree duplication, status bookkeeping and subtask progress.
//!
//! Tasks only store their `parent`; children are found by reverse lookup.
//! Recursive walks go level by level, one store query per level, and every
//! multi-document mutation goes through a single `Store::commit`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::access::{can_modify_task, can_view_task, is_member};
use crate::error::{ApiError, ApiResult};
use crate::models::task::{CreateTaskRequest, SubtaskProgress, UpdateTaskRequest};
use crate::models::{new_id, Assignee, Project, Task, TaskStatus};
use crate::store::{Store, StoreResult, TaskFilter, Write};

pub async fn load_task(store: &dyn Store, id: &str) -> ApiResult<Task> {
    store
        .find_task(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))
}

/// The project a task belongs to, if it still exists.
pub async fn task_project(store: &dyn Store, task: &Task) -> ApiResult<Option<Project>> {
    match &task.project {
        Some(id) => Ok(store.find_project(id).await?),
        None => Ok(None),
    }
}

pub async fn viewable_task(store: &dyn Store, requester: &str, id: &str) -> ApiResult<Task> {
    let task = load_task(store, id).await?;
    let project = task_project(store, &task).await?;
    if !can_view_task(&task, project.as_ref(), requester) {
        return Err(ApiError::Forbidden("Not authorized to access this task".into()));
    }
    Ok(task)
}

pub async fn modifiable_task(store: &dyn Store, requester: &str, id: &str) -> ApiResult<Task> {
    let task = load_task(store, id).await?;
    let project = task_project(store, &task).await?;
    if !can_modify_task(&task, project.as_ref(), requester) {
        return Err(ApiError::Forbidden("Not authorized to modify this task".into()));
    }
    Ok(task)
}

/// Whether making `candidate_parent` the parent of `child` would close a
/// loop. Walks up from the candidate; a missing ancestor ends the walk.
pub async fn would_create_cycle(
    store: &dyn Store,
    child: &str,
    candidate_parent: &str,
) -> StoreResult<bool> {
    if child == candidate_parent {
        return Ok(true);
    }
    let mut visited = HashSet::new();
    let mut current = candidate_parent.to_string();
    loop {
        if !visited.insert(current.clone()) {
            // Already corrupt: the ancestry loops without passing through `child`.
            return Ok(true);
        }
        let Some(node) = store.find_task(&current).await? else {
            return Ok(false);
        };
        match node.parent {
            Some(parent) if parent == child => return Ok(true),
            Some(parent) => current = parent,
            None => return Ok(false),
        }
    }
}

/// Validate `parent_id` as the parent of a task owned by `owner`. `child` is
/// the task being re-parented, or `None` for a task not yet stored.
async fn check_parent(
    store: &dyn Store,
    owner: &str,
    child: Option<&str>,
    parent_id: &str,
) -> ApiResult<Task> {
    let parent = store
        .find_task(parent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Parent task not found".into()))?;
    if parent.owner != owner {
        return Err(ApiError::InvalidReference(
            "Parent task belongs to another user".into(),
        ));
    }
    if let Some(child) = child {
        if would_create_cycle(store, child, parent_id).await? {
            return Err(ApiError::InvalidReference(
                "Cannot create circular reference in task hierarchy".into(),
            ));
        }
    }
    Ok(parent)
}

async fn check_category(store: &dyn Store, owner: &str, category: &str) -> ApiResult<()> {
    let found = store
        .find_category(category)
        .await?
        .ok_or_else(|| ApiError::NotFound("Category not found".into()))?;
    if found.owner != owner {
        return Err(ApiError::InvalidReference(
            "Category belongs to another user".into(),
        ));
    }
    Ok(())
}

async fn check_tags(store: &dyn Store, owner: &str, tags: &[String]) -> ApiResult<()> {
    for id in tags {
        let tag = store
            .find_tag(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Tag {} not found", id)))?;
        if tag.owner != owner {
            return Err(ApiError::InvalidReference("Tag belongs to another user".into()));
        }
    }
    Ok(())
}

async fn check_project(store: &dyn Store, requester: &str, project: &str) -> ApiResult<()> {
    let found = store
        .find_project(project)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".into()))?;
    if !is_member(&found, requester) {
        return Err(ApiError::InvalidReference(
            "Not a member of the referenced project".into(),
        ));
    }
    Ok(())
}

async fn check_assignees(store: &dyn Store, assignees: &[Assignee]) -> ApiResult<()> {
    let ids: Vec<String> = assignees.iter().map(|a| a.user.clone()).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let found = store.find_users(&ids).await?;
    for id in &ids {
        if !found.iter().any(|u| &u.id == id) {
            return Err(ApiError::NotFound(format!("Assignee {} not found", id)));
        }
    }
    Ok(())
}

fn check_title(title: &str) -> ApiResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Please add a title".into()));
    }
    Ok(title.to_string())
}

/// Stamp or clear `completed_at` for a status change. Staying completed
/// keeps the original stamp.
pub fn apply_status(task: &mut Task, status: TaskStatus, now: DateTime<Utc>) {
    if status == TaskStatus::Completed {
        if task.status != TaskStatus::Completed || task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    } else {
        task.completed_at = None;
    }
    task.status = status;
}

/// Create a task owned by `requester`. With a parent, the parent must be
/// one of the requester's tasks and its category is inherited when none is
/// given.
pub async fn create_task(
    store: &dyn Store,
    requester: &str,
    req: CreateTaskRequest,
) -> ApiResult<Task> {
    let title = check_title(&req.title)?;
    let mut category = req.category;

    if let Some(parent_id) = &req.parent {
        let parent = check_parent(store, requester, None, parent_id).await?;
        if category.is_none() {
            category = parent.category;
        }
    }
    if let Some(category) = &category {
        check_category(store, requester, category).await?;
    }
    let tags = req.tags.unwrap_or_default();
    check_tags(store, requester, &tags).await?;
    if let Some(project) = &req.project {
        check_project(store, requester, project).await?;
    }
    let assignees = req.assignees.unwrap_or_default();
    check_assignees(store, &assignees).await?;

    let now = Utc::now();
    let mut task = Task {
        id: new_id(),
        title,
        description: req.description,
        status: TaskStatus::Todo,
        priority: req.priority.unwrap_or_default(),
        due_date: req.due_date,
        completed_at: None,
        owner: requester.to_string(),
        category,
        tags,
        project: req.project,
        parent: req.parent,
        assignees,
        estimated_time: req.estimated_time.unwrap_or(0),
        actual_time: req.actual_time.unwrap_or(0),
        created_at: now,
        updated_at: now,
    };
    apply_status(&mut task, req.status.unwrap_or_default(), now);

    store.insert_task(&task).await?;
    info!("Task {} created by {}", task.id, requester);
    Ok(task)
}

/// Apply a field patch. References are checked against the task's owner,
/// which never changes.
pub async fn update_task(
    store: &dyn Store,
    requester: &str,
    id: &str,
    patch: UpdateTaskRequest,
) -> ApiResult<Task> {
    let mut task = modifiable_task(store, requester, id).await?;
    let now = Utc::now();

    if let Some(status) = patch.status {
        ensure_archivable(store, &task, status).await?;
    }
    if let Some(title) = &patch.title {
        task.title = check_title(title)?;
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(category) = patch.category {
        if let Some(category) = &category {
            check_category(store, &task.owner, category).await?;
        }
        task.category = category;
    }
    if let Some(tags) = patch.tags {
        check_tags(store, &task.owner, &tags).await?;
        task.tags = tags;
    }
    if let Some(project) = patch.project {
        if let Some(project) = &project {
            check_project(store, requester, project).await?;
        }
        task.project = project;
    }
    if let Some(parent) = patch.parent {
        if let Some(parent) = &parent {
            check_parent(store, &task.owner, Some(&task.id), parent).await?;
        }
        task.parent = parent;
    }
    if let Some(assignees) = patch.assignees {
        check_assignees(store, &assignees).await?;
        task.assignees = assignees;
    }
    if let Some(minutes) = patch.estimated_time {
        task.estimated_time = minutes;
    }
    if let Some(minutes) = patch.actual_time {
        task.actual_time = minutes;
    }
    if let Some(status) = patch.status {
        apply_status(&mut task, status, now);
    }
    task.updated_at = now;

    store.replace_task(&task).await?;
    info!("Task {} updated by {}", task.id, requester);
    Ok(task)
}

pub async fn set_status(
    store: &dyn Store,
    requester: &str,
    id: &str,
    status: TaskStatus,
) -> ApiResult<Task> {
    let mut task = modifiable_task(store, requester, id).await?;
    ensure_archivable(store, &task, status).await?;
    let now = Utc::now();
    apply_status(&mut task, status, now);
    task.updated_at = now;
    store.replace_task(&task).await?;
    info!("Task {} moved to {}", task.id, status.as_str());
    Ok(task)
}

/// Move a task under `new_parent`, or detach it with `None`. Nothing is
/// written when the move is rejected.
pub async fn reparent(
    store: &dyn Store,
    requester: &str,
    id: &str,
    new_parent: Option<&str>,
) -> ApiResult<Task> {
    let mut task = modifiable_task(store, requester, id).await?;
    if let Some(parent) = new_parent {
        check_parent(store, &task.owner, Some(&task.id), parent).await?;
    }
    task.parent = new_parent.map(str::to_string);
    task.updated_at = Utc::now();
    store.replace_task(&task).await?;
    info!("Task {} reparented to {:?}", task.id, task.parent);
    Ok(task)
}

async fn ensure_childless(store: &dyn Store, id: &str, action: &str) -> ApiResult<()> {
    if store.count_tasks(&TaskFilter::children_of(id)).await? > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot {} a task with subtasks. Please delete them first.",
            action
        )));
    }
    Ok(())
}

/// Moving into `archived` by any route is blocked while subtasks exist.
async fn ensure_archivable(store: &dyn Store, task: &Task, status: TaskStatus) -> ApiResult<()> {
    if status == TaskStatus::Archived && task.status != TaskStatus::Archived {
        ensure_childless(store, &task.id, "archive").await?;
    }
    Ok(())
}

pub async fn archive_task(store: &dyn Store, requester: &str, id: &str) -> ApiResult<Task> {
    let mut task = modifiable_task(store, requester, id).await?;
    ensure_childless(store, &task.id, "archive").await?;
    let now = Utc::now();
    apply_status(&mut task, TaskStatus::Archived, now);
    task.updated_at = now;
    store.replace_task(&task).await?;
    info!("Task {} archived", task.id);
    Ok(task)
}

/// Every descendant of `root`, level by level, siblings oldest first.
pub async fn collect_descendants(store: &dyn Store, root: &str) -> StoreResult<Vec<Task>> {
    let mut descendants = Vec::new();
    let mut frontier = vec![root.to_string()];
    while !frontier.is_empty() {
        let level = store
            .find_tasks(&TaskFilter::children_of_any(frontier))
            .await?;
        frontier = level.iter().map(|t| t.id.clone()).collect();
        descendants.extend(level);
    }
    Ok(descendants)
}

/// Delete a task. Without `force` any direct subtask blocks the delete; with
/// it the whole subtree goes in one transaction. Returns the number of tasks
/// removed.
///
/// Tasks attached between collecting the subtree and committing survive as
/// orphans; concurrent inserts are not locked out.
pub async fn delete_task(
    store: &dyn Store,
    requester: &str,
    id: &str,
    force: bool,
) -> ApiResult<usize> {
    let task = modifiable_task(store, requester, id).await?;
    let mut ids = vec![task.id.clone()];
    if force {
        let descendants = collect_descendants(store, &task.id).await?;
        ids.extend(descendants.into_iter().map(|t| t.id));
    } else {
        ensure_childless(store, &task.id, "delete").await?;
    }
    let removed = ids.len();
    store.commit(vec![Write::DeleteTasks(ids)]).await?;
    info!("Task {} deleted with {} descendants", task.id, removed - 1);
    Ok(removed)
}

fn copy_of(original: &Task, parent: Option<String>, created_at: DateTime<Utc>) -> Task {
    let completed_at = (original.status == TaskStatus::Completed).then_some(created_at);
    Task {
        id: new_id(),
        parent,
        completed_at,
        created_at,
        updated_at: created_at,
        ..original.clone()
    }
}

/// Copy a task, and with `include_subtasks` its whole subtree, inserting
/// every copy in one transaction. The root copy is titled "Copy of ..." and
/// lands next to the original. Returns the copies, root first.
pub async fn duplicate_task(
    store: &dyn Store,
    requester: &str,
    id: &str,
    include_subtasks: bool,
) -> ApiResult<Vec<Task>> {
    let original = modifiable_task(store, requester, id).await?;
    let now = Utc::now();

    let mut root = copy_of(&original, original.parent.clone(), now);
    root.title = format!("Copy of {}", original.title);

    let mut new_ids = HashMap::new();
    new_ids.insert(original.id.clone(), root.id.clone());
    let mut copies = vec![root];

    if include_subtasks {
        let mut frontier = vec![original.id.clone()];
        while !frontier.is_empty() {
            let level = store
                .find_tasks(&TaskFilter::children_of_any(frontier))
                .await?;
            frontier = Vec::with_capacity(level.len());
            for child in level {
                let parent = child.parent.as_ref().and_then(|p| new_ids.get(p)).cloned();
                // Spaced out so listing by creation time keeps sibling order.
                let stamp = now + Duration::milliseconds(copies.len() as i64);
                let copy = copy_of(&child, parent, stamp);
                new_ids.insert(child.id.clone(), copy.id.clone());
                frontier.push(child.id);
                copies.push(copy);
            }
        }
    }

    store.commit(vec![Write::InsertTasks(copies.clone())]).await?;
    info!("Task {} duplicated into {} copies", original.id, copies.len());
    Ok(copies)
}

pub fn progress_percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Progress of an eagerly loaded list of subtasks.
pub fn progress_of(subtasks: &[Task]) -> u8 {
    let completed = subtasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    progress_percent(completed as u64, subtasks.len() as u64)
}

pub async fn subtask_progress(store: &dyn Store, parent: &str) -> ApiResult<SubtaskProgress> {
    let total = store.count_tasks(&TaskFilter::children_of(parent)).await?;
    let completed = store
        .count_tasks(&TaskFilter::children_of(parent).with_status(TaskStatus::Completed))
        .await?;
    debug!("Task {} has {}/{} subtasks completed", parent, completed, total);
    Ok(SubtaskProgress {
        total,
        completed,
        progress: progress_percent(completed, total),
    })
}

/// Mark every direct subtask completed in one transaction and return them.
pub async fn complete_all_subtasks(
    store: &dyn Store,
    requester: &str,
    parent: &str,
) -> ApiResult<Vec<Task>> {
    let parent = modifiable_task(store, requester, parent).await?;
    let now = Utc::now();
    let mut subtasks = store.find_tasks(&TaskFilter::children_of(&parent.id)).await?;
    let mut writes = Vec::with_capacity(subtasks.len());
    for subtask in subtasks.iter_mut() {
        if subtask.status == TaskStatus::Completed {
            continue;
        }
        apply_status(subtask, TaskStatus::Completed, now);
        subtask.updated_at = now;
        writes.push(Write::ReplaceTask(subtask.clone()));
    }
    if !writes.is_empty() {
        store.commit(writes).await?;
    }
    info!("Completed all subtasks of {}", parent.id);
    Ok(subtasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{fixtures, MemoryStore};
    use crate::models::Category;

    async fn insert(store: &MemoryStore, owner: &str, title: &str, parent: Option<&str>) -> Task {
        let task = fixtures::task(owner, title, parent);
        store.insert_task(&task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn reparenting_under_a_descendant_is_rejected() {
        let store = MemoryStore::new();
        let a = insert(&store, "u1", "A", None).await;
        let b = insert(&store, "u1", "B", Some(&a.id)).await;
        let c = insert(&store, "u1", "C", Some(&b.id)).await;

        for target in [&b.id, &c.id, &a.id] {
            let res = reparent(&store, "u1", &a.id, Some(target)).await;
            assert!(matches!(res, Err(ApiError::InvalidReference(_))));
        }
        assert_eq!(load_task(&store, &a.id).await.unwrap().parent, None);

        let moved = reparent(&store, "u1", &c.id, Some(&a.id)).await.unwrap();
        assert_eq!(moved.parent.as_deref(), Some(a.id.as_str()));
        let detached = reparent(&store, "u1", &c.id, None).await.unwrap();
        assert_eq!(detached.parent, None);
    }

    #[tokio::test]
    async fn cycle_check_stops_at_missing_ancestors() {
        let store = MemoryStore::new();
        let orphan = insert(&store, "u1", "orphan", Some("gone")).await;
        assert!(!would_create_cycle(&store, "x", &orphan.id).await.unwrap());
        assert!(would_create_cycle(&store, "x", "x").await.unwrap());
    }

    #[tokio::test]
    async fn parents_must_share_the_owner() {
        let store = MemoryStore::new();
        let theirs = insert(&store, "u2", "theirs", None).await;
        let mine = insert(&store, "u1", "mine", None).await;

        let res = reparent(&store, "u1", &mine.id, Some(&theirs.id)).await;
        assert!(matches!(res, Err(ApiError::InvalidReference(_))));
        let res = reparent(&store, "u1", &mine.id, Some("nope")).await;
        assert!(matches!(res, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn completed_at_follows_status() {
        let store = MemoryStore::new();
        let task = insert(&store, "u1", "T", None).await;

        let done = set_status(&store, "u1", &task.id, TaskStatus::Completed).await.unwrap();
        let stamp = done.completed_at.expect("stamped on completion");

        let again = set_status(&store, "u1", &task.id, TaskStatus::Completed).await.unwrap();
        assert_eq!(again.completed_at, Some(stamp));

        let reopened = set_status(&store, "u1", &task.id, TaskStatus::InProgress).await.unwrap();
        assert_eq!(reopened.completed_at, None);
    }

    #[tokio::test]
    async fn children_block_delete_unless_forced() {
        let store = MemoryStore::new();
        let root = insert(&store, "u1", "root", None).await;
        let child = insert(&store, "u1", "child", Some(&root.id)).await;
        let grandchild = insert(&store, "u1", "grandchild", Some(&child.id)).await;
        let bystander = insert(&store, "u1", "bystander", None).await;

        let res = delete_task(&store, "u1", &root.id, false).await;
        assert!(matches!(res, Err(ApiError::Conflict(_))));
        let res = archive_task(&store, "u1", &root.id).await;
        assert!(matches!(res, Err(ApiError::Conflict(_))));

        assert_eq!(delete_task(&store, "u1", &root.id, true).await.unwrap(), 3);
        for id in [&root.id, &child.id, &grandchild.id] {
            assert!(store.find_task(id).await.unwrap().is_none());
        }
        assert!(store.find_task(&bystander.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn status_routes_cannot_archive_a_parent() {
        let store = MemoryStore::new();
        let root = insert(&store, "u1", "root", None).await;
        let child = insert(&store, "u1", "child", Some(&root.id)).await;

        let res = set_status(&store, "u1", &root.id, TaskStatus::Archived).await;
        assert!(matches!(res, Err(ApiError::Conflict(_))));
        let patch = UpdateTaskRequest {
            title: Some("renamed".into()),
            status: Some(TaskStatus::Archived),
            ..Default::default()
        };
        let res = update_task(&store, "u1", &root.id, patch).await;
        assert!(matches!(res, Err(ApiError::Conflict(_))));

        let stored = load_task(&store, &root.id).await.unwrap();
        assert_eq!(stored.status, root.status);
        assert_eq!(stored.title, "root");

        let archived = set_status(&store, "u1", &child.id, TaskStatus::Archived).await.unwrap();
        assert_eq!(archived.status, TaskStatus::Archived);
        let leaf = insert(&store, "u1", "leaf", None).await;
        let patch = UpdateTaskRequest {
            status: Some(TaskStatus::Archived),
            ..Default::default()
        };
        let archived = update_task(&store, "u1", &leaf.id, patch).await.unwrap();
        assert_eq!(archived.status, TaskStatus::Archived);
    }

    #[tokio::test]
    async fn strangers_cannot_delete() {
        let store = MemoryStore::new();
        let task = insert(&store, "u1", "T", None).await;
        let res = delete_task(&store, "u2", &task.id, true).await;
        assert!(matches!(res, Err(ApiError::Forbidden(_))));
        assert!(store.find_task(&task.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_copies_the_tree_shape() {
        let store = MemoryStore::new();
        let root = insert(&store, "u1", "root", None).await;
        let a = insert(&store, "u1", "a", Some(&root.id)).await;
        let _b = insert(&store, "u1", "b", Some(&root.id)).await;
        let _a1 = insert(&store, "u1", "a1", Some(&a.id)).await;

        let copies = duplicate_task(&store, "u1", &root.id, true).await.unwrap();
        assert_eq!(copies.len(), 4);
        let copy_root = &copies[0];
        assert_eq!(copy_root.title, "Copy of root");
        assert_eq!(copy_root.parent, None);

        let children = store
            .find_tasks(&TaskFilter::children_of(&copy_root.id))
            .await
            .unwrap();
        let titles: Vec<&str> = children.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_ne!(children[0].id, a.id);

        let grandchildren = store
            .find_tasks(&TaskFilter::children_of(&children[0].id))
            .await
            .unwrap();
        assert_eq!(grandchildren.len(), 1);
        assert_eq!(grandchildren[0].title, "a1");

        let original_children = store.find_tasks(&TaskFilter::children_of(&root.id)).await.unwrap();
        assert_eq!(original_children.len(), 2);
        assert_eq!(load_task(&store, &root.id).await.unwrap(), root);
    }

    #[tokio::test]
    async fn duplicate_without_subtasks_copies_only_the_root() {
        let store = MemoryStore::new();
        let parent = insert(&store, "u1", "parent", None).await;
        let task = insert(&store, "u1", "task", Some(&parent.id)).await;
        insert(&store, "u1", "child", Some(&task.id)).await;

        let copies = duplicate_task(&store, "u1", &task.id, false).await.unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].parent.as_deref(), Some(parent.id.as_str()));
        let children = store.find_tasks(&TaskFilter::children_of(&copies[0].id)).await.unwrap();
        assert!(children.is_empty());
    }

    #[tokio::test]
    async fn progress_counts_direct_subtasks() {
        let store = MemoryStore::new();
        let root = insert(&store, "u1", "root", None).await;
        assert_eq!(subtask_progress(&store, &root.id).await.unwrap().progress, 0);

        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            ids.push(insert(&store, "u1", title, Some(&root.id)).await.id);
        }
        set_status(&store, "u1", &ids[0], TaskStatus::Completed).await.unwrap();

        let progress = subtask_progress(&store, &root.id).await.unwrap();
        assert_eq!((progress.completed, progress.total, progress.progress), (1, 3, 33));
        let loaded = store.find_tasks(&TaskFilter::children_of(&root.id)).await.unwrap();
        assert_eq!(progress_of(&loaded), 33);

        let done = complete_all_subtasks(&store, "u1", &root.id).await.unwrap();
        assert!(done.iter().all(|t| t.completed_at.is_some()));
        assert_eq!(subtask_progress(&store, &root.id).await.unwrap().progress, 100);
    }

    #[test]
    fn progress_rounds_to_nearest() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(1, 8), 13);
    }

    #[tokio::test]
    async fn foreign_categories_are_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let theirs = Category {
            id: new_id(),
            name: "Theirs".into(),
            color: "#fff".into(),
            icon: "folder".into(),
            owner: "u2".into(),
            is_default: false,
            created_at: now,
            updated_at: now,
        };
        store.insert_categories(&[theirs.clone()]).await.unwrap();

        let req = CreateTaskRequest {
            title: "T".into(),
            category: Some(theirs.id.clone()),
            ..Default::default()
        };
        let res = create_task(&store, "u1", req).await;
        assert!(matches!(res, Err(ApiError::InvalidReference(_))));

        let req = CreateTaskRequest {
            title: "T".into(),
            category: Some("missing".into()),
            ..Default::default()
        };
        let res = create_task(&store, "u1", req).await;
        assert!(matches!(res, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn subtasks_inherit_the_parent_category() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let work = Category {
            id: new_id(),
            name: "Work".into(),
            color: "#e74c3c".into(),
            icon: "briefcase".into(),
            owner: "u1".into(),
            is_default: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_categories(&[work.clone()]).await.unwrap();
        let mut parent = fixtures::task("u1", "parent", None);
        parent.category = Some(work.id.clone());
        store.insert_task(&parent).await.unwrap();

        let req = CreateTaskRequest {
            title: "child".into(),
            parent: Some(parent.id.clone()),
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let child = create_task(&store, "u1", req).await.unwrap();
        assert_eq!(child.category, Some(work.id));
        assert!(child.completed_at.is_some());
    }
}
