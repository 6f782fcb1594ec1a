//! MongoDB `Store` backend. Multi-document writes run inside a client-session
//! transaction, so the deployment must be a replica set (or sharded cluster).

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{info, warn};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};

use crate::models::{Category, Project, Tag, Task, Team, User};
use crate::store::{Store, StoreError, StoreResult, TaskFilter, Write};

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> StoreResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        let mongodb = MongoDB { client, db };
        mongodb.ensure_indexes().await?;
        info!("Connected to MongoDB database {}", db_name);
        Ok(mongodb)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn tasks(&self) -> Collection<Task> {
        self.db.collection("tasks")
    }

    fn categories(&self) -> Collection<Category> {
        self.db.collection("categories")
    }

    fn tags(&self) -> Collection<Tag> {
        self.db.collection("tags")
    }

    fn projects(&self) -> Collection<Project> {
        self.db.collection("projects")
    }

    fn teams(&self) -> Collection<Team> {
        self.db.collection("teams")
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        for name in ["categories", "tags", "projects", "teams"] {
            self.db
                .collection::<Document>(name)
                .create_index(
                    IndexModel::builder()
                        .keys(doc! { "name": 1, "owner": 1 })
                        .options(unique.clone())
                        .build(),
                )
                .await?;
        }

        let task_keys = [
            doc! { "owner": 1, "status": 1 },
            doc! { "parent": 1 },
            doc! { "project": 1 },
            doc! { "category": 1 },
            doc! { "tags": 1 },
            doc! { "assignees.user": 1 },
        ];
        for keys in task_keys {
            self.tasks()
                .create_index(IndexModel::builder().keys(keys).build())
                .await?;
        }

        self.projects()
            .create_index(IndexModel::builder().keys(doc! { "members.user": 1 }).build())
            .await?;
        self.teams()
            .create_index(IndexModel::builder().keys(doc! { "members.user": 1 }).build())
            .await?;
        Ok(())
    }

    async fn apply(&self, write: Write, session: &mut ClientSession) -> StoreResult<()> {
        match write {
            Write::InsertTasks(tasks) => {
                if !tasks.is_empty() {
                    self.tasks()
                        .insert_many(tasks)
                        .session(&mut *session)
                        .await
                        .map_err(|e| classify(e, "task"))?;
                }
            }
            Write::ReplaceTask(task) => {
                let res = self
                    .tasks()
                    .replace_one(doc! { "_id": &task.id }, &task)
                    .session(&mut *session)
                    .await?;
                if res.matched_count == 0 {
                    return Err(StoreError::Missing(format!("task {}", task.id)));
                }
            }
            Write::DeleteTasks(ids) => {
                if !ids.is_empty() {
                    self.tasks()
                        .delete_many(doc! { "_id": { "$in": ids } })
                        .session(&mut *session)
                        .await?;
                }
            }
            Write::DetachCategory(id) => {
                self.tasks()
                    .update_many(doc! { "category": &id }, doc! { "$set": { "category": Bson::Null } })
                    .session(&mut *session)
                    .await?;
            }
            Write::DeleteCategory(id) => {
                self.categories()
                    .delete_one(doc! { "_id": id })
                    .session(&mut *session)
                    .await?;
            }
            Write::PullTag(id) => {
                self.tasks()
                    .update_many(doc! { "tags": &id }, doc! { "$pull": { "tags": &id } })
                    .session(&mut *session)
                    .await?;
            }
            Write::DeleteTag(id) => {
                self.tags()
                    .delete_one(doc! { "_id": id })
                    .session(&mut *session)
                    .await?;
            }
            Write::ReplaceProject(project) => {
                let res = self
                    .projects()
                    .replace_one(doc! { "_id": &project.id }, &project)
                    .session(&mut *session)
                    .await
                    .map_err(|e| classify(e, "project"))?;
                if res.matched_count == 0 {
                    return Err(StoreError::Missing(format!("project {}", project.id)));
                }
            }
            Write::DetachProject(id) => {
                self.tasks()
                    .update_many(doc! { "project": &id }, doc! { "$set": { "project": Bson::Null } })
                    .session(&mut *session)
                    .await?;
            }
            Write::DeleteProject(id) => {
                self.projects()
                    .delete_one(doc! { "_id": id })
                    .session(&mut *session)
                    .await?;
            }
            Write::ReplaceTeam(team) => {
                let res = self
                    .teams()
                    .replace_one(doc! { "_id": &team.id }, &team)
                    .session(&mut *session)
                    .await
                    .map_err(|e| classify(e, "team"))?;
                if res.matched_count == 0 {
                    return Err(StoreError::Missing(format!("team {}", team.id)));
                }
            }
            Write::DetachTeam(id) => {
                self.projects()
                    .update_many(doc! { "team": &id }, doc! { "$set": { "team": Bson::Null } })
                    .session(&mut *session)
                    .await?;
            }
            Write::DeleteTeam(id) => {
                self.teams()
                    .delete_one(doc! { "_id": id })
                    .session(&mut *session)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Turn unique-index violations into `StoreError::Duplicate`. Bulk inserts
/// report them as a different error kind, so the server code in the message
/// is checked too.
fn classify(err: mongodb::error::Error, what: &str) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        _ => err.to_string().contains("E11000"),
    };
    if duplicate {
        StoreError::Duplicate(what.to_string())
    } else {
        StoreError::Mongo(err)
    }
}

fn task_filter_document(filter: &TaskFilter) -> Document {
    let mut query = doc! {};
    if let Some(owner) = &filter.owner {
        query.insert("owner", owner.as_str());
    }
    if let Some(parents) = &filter.parents {
        query.insert("parent", doc! { "$in": parents.clone() });
    }
    if filter.roots_only {
        // Matches both an explicit null and a missing field.
        query.insert("parent", Bson::Null);
    }
    if let Some(project) = &filter.project {
        query.insert("project", project.as_str());
    }
    if let Some(category) = &filter.category {
        query.insert("category", category.as_str());
    }
    if let Some(tag) = &filter.tag {
        query.insert("tags", tag.as_str());
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    query
}

#[async_trait]
impl Store for MongoDB {
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let cursor = self.users().find(doc! { "_id": { "$in": ids.to_vec() } }).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users()
            .insert_one(user)
            .await
            .map_err(|e| classify(e, "user"))?;
        Ok(())
    }

    async fn replace_user(&self, user: &User) -> StoreResult<()> {
        let res = self
            .users()
            .replace_one(doc! { "_id": &user.id }, user)
            .await
            .map_err(|e| classify(e, "user"))?;
        if res.matched_count == 0 {
            return Err(StoreError::Missing(format!("user {}", user.id)));
        }
        Ok(())
    }

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.tasks().find_one(doc! { "_id": id }).await?)
    }

    async fn find_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let cursor = self
            .tasks()
            .find(task_filter_document(filter))
            .sort(doc! { "created_at": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> StoreResult<u64> {
        Ok(self.tasks().count_documents(task_filter_document(filter)).await?)
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.tasks()
            .insert_one(task)
            .await
            .map_err(|e| classify(e, "task"))?;
        Ok(())
    }

    async fn replace_task(&self, task: &Task) -> StoreResult<()> {
        let res = self.tasks().replace_one(doc! { "_id": &task.id }, task).await?;
        if res.matched_count == 0 {
            return Err(StoreError::Missing(format!("task {}", task.id)));
        }
        Ok(())
    }

    async fn find_category(&self, id: &str) -> StoreResult<Option<Category>> {
        Ok(self.categories().find_one(doc! { "_id": id }).await?)
    }

    async fn find_categories(&self, owner: &str) -> StoreResult<Vec<Category>> {
        let cursor = self
            .categories()
            .find(doc! { "owner": owner })
            .sort(doc! { "name": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_category_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Category>> {
        Ok(self
            .categories()
            .find_one(doc! { "owner": owner, "name": name })
            .await?)
    }

    async fn insert_categories(&self, categories: &[Category]) -> StoreResult<()> {
        if categories.is_empty() {
            return Ok(());
        }
        self.categories()
            .insert_many(categories)
            .await
            .map_err(|e| classify(e, "category"))?;
        Ok(())
    }

    async fn replace_category(&self, category: &Category) -> StoreResult<()> {
        let res = self
            .categories()
            .replace_one(doc! { "_id": &category.id }, category)
            .await
            .map_err(|e| classify(e, "category"))?;
        if res.matched_count == 0 {
            return Err(StoreError::Missing(format!("category {}", category.id)));
        }
        Ok(())
    }

    async fn find_tag(&self, id: &str) -> StoreResult<Option<Tag>> {
        Ok(self.tags().find_one(doc! { "_id": id }).await?)
    }

    async fn find_tags(&self, owner: &str) -> StoreResult<Vec<Tag>> {
        let cursor = self
            .tags()
            .find(doc! { "owner": owner })
            .sort(doc! { "name": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_tag_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Tag>> {
        Ok(self.tags().find_one(doc! { "owner": owner, "name": name }).await?)
    }

    async fn insert_tags(&self, tags: &[Tag]) -> StoreResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        self.tags()
            .insert_many(tags)
            .await
            .map_err(|e| classify(e, "tag"))?;
        Ok(())
    }

    async fn replace_tag(&self, tag: &Tag) -> StoreResult<()> {
        let res = self
            .tags()
            .replace_one(doc! { "_id": &tag.id }, tag)
            .await
            .map_err(|e| classify(e, "tag"))?;
        if res.matched_count == 0 {
            return Err(StoreError::Missing(format!("tag {}", tag.id)));
        }
        Ok(())
    }

    async fn find_project(&self, id: &str) -> StoreResult<Option<Project>> {
        Ok(self.projects().find_one(doc! { "_id": id }).await?)
    }

    async fn find_projects_for_member(&self, user_id: &str) -> StoreResult<Vec<Project>> {
        let cursor = self
            .projects()
            .find(doc! { "members.user": user_id })
            .sort(doc! { "updated_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_projects_by_team(&self, team_id: &str) -> StoreResult<Vec<Project>> {
        let cursor = self
            .projects()
            .find(doc! { "team": team_id })
            .sort(doc! { "updated_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_project_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Project>> {
        Ok(self
            .projects()
            .find_one(doc! { "owner": owner, "name": name })
            .await?)
    }

    async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        self.projects()
            .insert_one(project)
            .await
            .map_err(|e| classify(e, "project"))?;
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.teams().find_one(doc! { "_id": id }).await?)
    }

    async fn find_teams_for_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        let cursor = self
            .teams()
            .find(doc! { "members.user": user_id })
            .sort(doc! { "updated_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_team_by_name(&self, owner: &str, name: &str) -> StoreResult<Option<Team>> {
        Ok(self.teams().find_one(doc! { "owner": owner, "name": name }).await?)
    }

    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        self.teams()
            .insert_one(team)
            .await
            .map_err(|e| classify(e, "team"))?;
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> StoreResult<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        for write in writes {
            if let Err(err) = self.apply(write, &mut session).await {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!("Failed to abort transaction: {}", abort_err);
                }
                return Err(err);
            }
        }
        session.commit_transaction().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;

    #[test]
    fn filter_document_uses_set_membership_for_parents() {
        let filter = TaskFilter::children_of_any(vec!["a".into(), "b".into()]);
        let query = task_filter_document(&filter);
        assert_eq!(query, doc! { "parent": { "$in": ["a", "b"] } });
    }

    #[test]
    fn filter_document_combines_owner_roots_and_status() {
        let filter = TaskFilter::owned_by("u1").roots().with_status(TaskStatus::InProgress);
        let query = task_filter_document(&filter);
        assert_eq!(
            query,
            doc! { "owner": "u1", "parent": Bson::Null, "status": "in_progress" }
        );
    }
}
