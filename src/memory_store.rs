//! In-process `Store` backend. Selected with `STORE_BACKEND=memory` for local
//! runs without MongoDB, and used by the test suites.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::access::is_member;
use crate::models::{Category, Project, Tag, Task, Team, User};
use crate::store::{Store, StoreError, StoreResult, TaskFilter, Write};

#[derive(Debug, Clone, Default)]
struct Collections {
    users: Vec<User>,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    projects: Vec<Project>,
    teams: Vec<Team>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn replace_by_id<T: Clone>(
    items: &mut [T],
    item: &T,
    id_of: impl Fn(&T) -> &str,
    what: &str,
) -> StoreResult<()> {
    let id = id_of(item);
    match items.iter_mut().find(|existing| id_of(existing) == id) {
        Some(slot) => {
            *slot = item.clone();
            Ok(())
        }
        None => Err(StoreError::Missing(format!("{} {}", what, id))),
    }
}

impl Collections {
    fn apply(&mut self, write: Write) -> StoreResult<()> {
        match write {
            Write::InsertTasks(tasks) => {
                for task in &tasks {
                    if self.tasks.iter().any(|t| t.id == task.id) {
                        return Err(StoreError::Duplicate(format!("task {}", task.id)));
                    }
                }
                self.tasks.extend(tasks);
            }
            Write::ReplaceTask(task) => {
                replace_by_id(&mut self.tasks, &task, |t| t.id.as_str(), "task")?;
            }
            Write::DeleteTasks(ids) => {
                let ids: HashSet<String> = ids.into_iter().collect();
                self.tasks.retain(|t| !ids.contains(&t.id));
            }
            Write::DetachCategory(id) => {
                for task in self.tasks.iter_mut() {
                    if task.category.as_deref() == Some(id.as_str()) {
                        task.category = None;
                    }
                }
            }
            Write::DeleteCategory(id) => self.categories.retain(|c| c.id != id),
            Write::PullTag(id) => {
                for task in self.tasks.iter_mut() {
                    task.tags.retain(|t| t != &id);
                }
            }
            Write::DeleteTag(id) => self.tags.retain(|t| t.id != id),
            Write::ReplaceProject(project) => {
                self.check_unique_project(&project)?;
                replace_by_id(&mut self.projects, &project, |p| p.id.as_str(), "project")?;
            }
            Write::DetachProject(id) => {
                for task in self.tasks.iter_mut() {
                    if task.project.as_deref() == Some(id.as_str()) {
                        task.project = None;
                    }
                }
            }
            Write::DeleteProject(id) => self.projects.retain(|p| p.id != id),
            Write::ReplaceTeam(team) => {
                self.check_unique_team(&team)?;
                replace_by_id(&mut self.teams, &team, |t| t.id.as_str(), "team")?;
            }
            Write::DetachTeam(id) => {
                for project in self.projects.iter_mut() {
                    if project.team.as_deref() == Some(id.as_str()) {
                        project.team = None;
                    }
                }
            }
            Write::DeleteTeam(id) => self.teams.retain(|t| t.id != id),
        }
        Ok(())
    }

    fn check_unique_project(&self, project: &Project) -> StoreResult<()> {
        let clash = self
            .projects
            .iter()
            .any(|p| p.id != project.id && p.owner == project.owner && p.name == project.name);
        if clash {
            return Err(StoreError::Duplicate("project".to_string()));
        }
        Ok(())
    }

    fn check_unique_team(&self, team: &Team) -> StoreResult<()> {
        let clash = self
            .teams
            .iter()
            .any(|t| t.id != team.id && t.owner == team.owner && t.name == team.name);
        if clash {
            return Err(StoreError::Duplicate("team".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        Ok(self
            .state
            .read()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("user".to_string()));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.users.iter().any(|u| u.id != user.id && u.email == user.email) {
            return Err(StoreError::Duplicate("user".to_string()));
        }
        replace_by_id(&mut state.users, user, |u| u.id.as_str(), "user")
    }

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.state.read().tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .state
            .read()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        // Stable: tasks created in the same instant keep insertion order.
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> StoreResult<u64> {
        Ok(self.state.read().tasks.iter().filter(|t| filter.matches(t)).count() as u64)
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.state.write().apply(Write::InsertTasks(vec![task.clone()]))
    }

    async fn replace_task(&self, task: &Task) -> StoreResult<()> {
        self.state.write().apply(Write::ReplaceTask(task.clone()))
    }

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.state.read().categories.iter().find(|c| c.id == id).cloned())
    }

    async fn find_categories(&self, owner: &str) -> StoreResult<Vec<Category>> {
        let mut categories: Vec<Category> = self
            .state
            .read()
            .categories
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn find_category_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .state
            .read()
            .categories
            .iter()
            .find(|c| c.owner == owner && c.name == name)
            .cloned())
    }

    async fn insert_categories(&self, categories: &[Category]) -> StoreResult<()> {
        let mut state = self.state.write();
        for category in categories {
            let clash = state
                .categories
                .iter()
                .any(|c| c.owner == category.owner && c.name == category.name);
            if clash {
                return Err(StoreError::Duplicate("category".to_string()));
            }
        }
        state.categories.extend_from_slice(categories);
        Ok(())
    }

    async fn replace_category(&self, category: &Category) -> StoreResult<()> {
        let mut state = self.state.write();
        let clash = state
            .categories
            .iter()
            .any(|c| c.id != category.id && c.owner == category.owner && c.name == category.name);
        if clash {
            return Err(StoreError::Duplicate("category".to_string()));
        }
        replace_by_id(&mut state.categories, category, |c| c.id.as_str(), "category")
    }

    async fn find_tag(&self, id: &str) -> StoreResult<Option<Tag>> {
        Ok(self.state.read().tags.iter().find(|t| t.id == id).cloned())
    }

    async fn find_tags(&self, owner: &str) -> StoreResult<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .state
            .read()
            .tags
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find_tag_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self
            .state
            .read()
            .tags
            .iter()
            .find(|t| t.owner == owner && t.name == name)
            .cloned())
    }

    async fn insert_tags(&self, tags: &[Tag]) -> StoreResult<()> {
        let mut state = self.state.write();
        for tag in tags {
            if state.tags.iter().any(|t| t.owner == tag.owner && t.name == tag.name) {
                return Err(StoreError::Duplicate("tag".to_string()));
            }
        }
        state.tags.extend_from_slice(tags);
        Ok(())
    }

    async fn replace_tag(&self, tag: &Tag) -> StoreResult<()> {
        let mut state = self.state.write();
        let clash = state
            .tags
            .iter()
            .any(|t| t.id != tag.id && t.owner == tag.owner && t.name == tag.name);
        if clash {
            return Err(StoreError::Duplicate("tag".to_string()));
        }
        replace_by_id(&mut state.tags, tag, |t| t.id.as_str(), "tag")
    }

    async fn find_project(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(self.state.read().projects.iter().find(|p| p.id == id).cloned())
    }

    async fn find_projects_for_member(&self, user_id: &str) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .state
            .read()
            .projects
            .iter()
            .filter(|p| is_member(*p, user_id))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn find_projects_by_team(&self, team_id: &str) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .state
            .read()
            .projects
            .iter()
            .filter(|p| p.team.as_deref() == Some(team_id))
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(projects)
    }

    async fn find_project_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .state
            .read()
            .projects
            .iter()
            .find(|p| p.owner == owner && p.name == name)
            .cloned())
    }

    async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_unique_project(project)?;
        state.projects.push(project.clone());
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.state.read().teams.iter().find(|t| t.id == id).cloned())
    }

    async fn find_teams_for_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        let mut teams: Vec<Team> = self
            .state
            .read()
            .teams
            .iter()
            .filter(|t| is_member(*t, user_id))
            .cloned()
            .collect();
        teams.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(teams)
    }

    async fn find_team_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Team>> {
        Ok(self
            .state
            .read()
            .teams
            .iter()
            .find(|t| t.owner == owner && t.name == name)
            .cloned())
    }

    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        let mut state = self.state.write();
        state.check_unique_team(team)?;
        state.teams.push(team.clone());
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        let mut state = self.state.write();
        let mut staged = state.clone();
        for write in writes {
            staged.apply(write)?;
        }
        *state = staged;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;

    use crate::models::{new_id, Member, MemberRole, Project, Task, TaskPriority, TaskStatus};

    pub fn task(owner: &str, title: &str, parent: Option<&str>) -> Task {
        let now = Utc::now();
        Task {
            id: new_id(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            due_date: None,
            completed_at: None,
            owner: owner.to_string(),
            category: None,
            tags: Vec::new(),
            project: None,
            parent: parent.map(str::to_string),
            assignees: Vec::new(),
            estimated_time: 0,
            actual_time: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn project(owner: &str, name: &str) -> Project {
        let now = Utc::now();
        Project {
            id: new_id(),
            name: name.to_string(),
            description: None,
            color: "#3498db".to_string(),
            icon: "briefcase".to_string(),
            start_date: None,
            end_date: None,
            status: Default::default(),
            owner: owner.to_string(),
            team: None,
            members: vec![Member::new(owner, MemberRole::Owner)],
            is_private: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{project, task};
    use super::*;

    #[tokio::test]
    async fn failed_commit_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let keep = task("u1", "keep me", None);
        store.insert_task(&keep).await.unwrap();

        let missing = project("u1", "never inserted");
        let res = store
            .commit(vec![
                Write::DeleteTasks(vec![keep.id.clone()]),
                Write::ReplaceProject(missing),
            ])
            .await;

        assert!(matches!(res, Err(StoreError::Missing(_))));
        assert!(store.find_task(&keep.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tag_pull_and_category_detach_touch_every_task() {
        let store = MemoryStore::new();
        let mut a = task("u1", "a", None);
        a.tags = vec!["t1".into(), "t2".into()];
        a.category = Some("c1".into());
        let mut b = task("u1", "b", None);
        b.tags = vec!["t1".into()];
        store.insert_task(&a).await.unwrap();
        store.insert_task(&b).await.unwrap();

        store
            .commit(vec![Write::PullTag("t1".into()), Write::DetachCategory("c1".into())])
            .await
            .unwrap();

        let a = store.find_task(&a.id).await.unwrap().unwrap();
        let b = store.find_task(&b.id).await.unwrap().unwrap();
        assert_eq!(a.tags, vec!["t2".to_string()]);
        assert_eq!(a.category, None);
        assert!(b.tags.is_empty());
    }

    #[tokio::test]
    async fn filters_by_parent_set_and_roots() {
        let store = MemoryStore::new();
        let root = task("u1", "root", None);
        let child = task("u1", "child", Some(&root.id));
        let other = task("u2", "other", None);
        for t in [&root, &child, &other] {
            store.insert_task(t).await.unwrap();
        }

        let children = store
            .find_tasks(&TaskFilter::children_of(root.id.clone()))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);

        let roots = store.find_tasks(&TaskFilter::owned_by("u1").roots()).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, root.id);
    }

    #[tokio::test]
    async fn duplicate_project_names_per_owner_are_rejected() {
        let store = MemoryStore::new();
        store.insert_project(&project("u1", "Apollo")).await.unwrap();
        let res = store.insert_project(&project("u1", "Apollo")).await;
        assert!(matches!(res, Err(StoreError::Duplicate(_))));
        store.insert_project(&project("u2", "Apollo")).await.unwrap();
    }
}
