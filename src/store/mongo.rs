use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use log::info;
use mongodb::bson::{doc, to_bson, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use super::{InvitationStore, StoreResult, TaskStore, TeamStore, UserStore};
use crate::models::{
    Comment, Invitation, InvitationStatus, ProfileChanges, Task, TaskChanges, Team, User,
};

pub const TASKS: &str = "tasks";
pub const USERS: &str = "users";
pub const TEAMS: &str = "teams";
pub const INVITATIONS: &str = "invitations";

pub struct MongoStore {
    pub db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> StoreResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        Ok(MongoStore {
            db: client.database(db_name),
        })
    }

    /// Creates the indexes the core queries rely on. Safe to call on every boot.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.users()
            .create_index(IndexModel::builder().keys(doc! { "username": 1 }).options(unique()).build())
            .await?;
        self.users()
            .create_index(IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build())
            .await?;
        self.tasks()
            .create_index(IndexModel::builder().keys(doc! { "complete": 1, "overdueNotified": 1 }).build())
            .await?;
        self.invitations()
            .create_index(IndexModel::builder().keys(doc! { "invitedUser": 1, "status": 1 }).build())
            .await?;
        self.teams()
            .create_index(IndexModel::builder().keys(doc! { "members": 1 }).build())
            .await?;
        info!("MongoDB indexes ensured on database {}", self.db.name());
        Ok(())
    }

    fn tasks(&self) -> Collection<Task> {
        self.db.collection::<Task>(TASKS)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection::<User>(USERS)
    }

    fn teams(&self) -> Collection<Team> {
        self.db.collection::<Team>(TEAMS)
    }

    fn invitations(&self) -> Collection<Invitation> {
        self.db.collection::<Invitation>(INVITATIONS)
    }
}

fn touched() -> StoreResult<mongodb::bson::Bson> {
    Ok(to_bson(&Utc::now())?)
}

#[async_trait]
impl TaskStore for MongoStore {
    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.tasks().insert_one(task).await?;
        Ok(())
    }

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.tasks().find_one(doc! { "_id": id }).await?)
    }

    async fn find_unnotified_incomplete(&self) -> StoreResult<Vec<Task>> {
        let filter = doc! { "complete": false, "overdueNotified": false };
        Ok(self.tasks().find(filter).await?.try_collect().await?)
    }

    async fn find_tasks_assigned_to(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        let filter = doc! { "assignedUsers": user_id };
        Ok(self.tasks().find(filter).await?.try_collect().await?)
    }

    async fn find_team_tasks(&self, team_id: &str) -> StoreResult<Vec<Task>> {
        let filter = doc! { "teamId": team_id };
        Ok(self.tasks().find(filter).await?.try_collect().await?)
    }

    async fn set_complete(
        &self,
        id: &str,
        complete: bool,
        completed_by: Option<&str>,
    ) -> StoreResult<bool> {
        let update = doc! {
            "$set": {
                "complete": complete,
                "completedBy": completed_by,
                "updatedAt": touched()?,
            }
        };
        let res = self.tasks().update_one(doc! { "_id": id }, update).await?;
        Ok(res.matched_count > 0)
    }

    async fn update_task(&self, id: &str, changes: &TaskChanges) -> StoreResult<bool> {
        let mut set = doc! { "updatedAt": touched()? };
        if let Some(title) = &changes.title {
            set.insert("title", title.as_str());
        }
        if let Some(description) = &changes.description {
            set.insert("desc", description.as_str());
        }
        if let Some(priority) = changes.priority {
            set.insert("priority", to_bson(&priority)?);
        }
        if let Some(date) = &changes.due_date {
            set.insert("dueDate", date.as_str());
        }
        if let Some(time) = &changes.due_time {
            set.insert("dueTime", time.as_str());
        }
        if let Some(attachment) = &changes.attachment {
            set.insert("attachment", attachment.as_str());
        }
        let res = self.tasks().update_one(doc! { "_id": id }, doc! { "$set": set }).await?;
        Ok(res.matched_count > 0)
    }

    async fn set_important(&self, id: &str, important: bool) -> StoreResult<bool> {
        let update = doc! { "$set": { "important": important, "updatedAt": touched()? } };
        let res = self.tasks().update_one(doc! { "_id": id }, update).await?;
        Ok(res.matched_count > 0)
    }

    async fn mark_overdue_notified(&self, id: &str) -> StoreResult<bool> {
        let filter = doc! { "_id": id, "overdueNotified": false };
        let update = doc! { "$set": { "overdueNotified": true, "updatedAt": touched()? } };
        let res = self.tasks().update_one(filter, update).await?;
        Ok(res.modified_count == 1)
    }

    async fn push_comment(&self, task_id: &str, comment: &Comment) -> StoreResult<bool> {
        let update = doc! { "$push": { "comments": to_bson(comment)? } };
        let res = self.tasks().update_one(doc! { "_id": task_id }, update).await?;
        Ok(res.matched_count > 0)
    }

    async fn pull_comment(&self, task_id: &str, comment_id: &str) -> StoreResult<bool> {
        let update = doc! { "$pull": { "comments": { "_id": comment_id } } };
        let res = self.tasks().update_one(doc! { "_id": task_id }, update).await?;
        Ok(res.modified_count > 0)
    }

    async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        let res = self.tasks().delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count > 0)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users().insert_one(user).await?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "username": username }).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn find_users_by_emails(&self, emails: &[String]) -> StoreResult<Vec<User>> {
        let filter = doc! { "email": { "$in": emails.to_vec() } };
        Ok(self.users().find(filter).await?.try_collect().await?)
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let filter = doc! { "_id": { "$in": ids.to_vec() } };
        Ok(self.users().find(filter).await?.try_collect().await?)
    }

    async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> StoreResult<bool> {
        let mut set = Document::new();
        if let Some(username) = &changes.username {
            set.insert("username", username.as_str());
        }
        if let Some(email) = &changes.email {
            set.insert("email", email.as_str());
        }
        if let Some(hash) = &changes.password_hash {
            set.insert("password", hash.as_str());
        }
        if set.is_empty() {
            return Ok(self.find_user(id).await?.is_some());
        }
        let res = self.users().update_one(doc! { "_id": id }, doc! { "$set": set }).await?;
        Ok(res.matched_count > 0)
    }

    async fn push_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        let update = doc! { "$addToSet": { "tasks": task_id } };
        self.users().update_one(doc! { "_id": user_id }, update).await?;
        Ok(())
    }

    async fn pull_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        let update = doc! { "$pull": { "tasks": task_id } };
        self.users().update_one(doc! { "_id": user_id }, update).await?;
        Ok(())
    }
}

#[async_trait]
impl TeamStore for MongoStore {
    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        self.teams().insert_one(team).await?;
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.teams().find_one(doc! { "_id": id }).await?)
    }

    async fn find_teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        let filter = doc! { "members": user_id };
        Ok(self.teams().find(filter).await?.try_collect().await?)
    }

    async fn add_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool> {
        let update = doc! { "$addToSet": { "members": user_id } };
        let res = self.teams().update_one(doc! { "_id": team_id }, update).await?;
        Ok(res.matched_count > 0)
    }

    async fn remove_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool> {
        let update = doc! { "$pull": { "members": user_id } };
        let res = self.teams().update_one(doc! { "_id": team_id }, update).await?;
        Ok(res.modified_count > 0)
    }

    async fn delete_team(&self, id: &str) -> StoreResult<bool> {
        let res = self.teams().delete_one(doc! { "_id": id }).await?;
        Ok(res.deleted_count > 0)
    }
}

#[async_trait]
impl InvitationStore for MongoStore {
    async fn insert_invitations(&self, invitations: &[Invitation]) -> StoreResult<()> {
        if invitations.is_empty() {
            return Ok(());
        }
        self.invitations().insert_many(invitations).await?;
        Ok(())
    }

    async fn find_invitation(&self, id: &str) -> StoreResult<Option<Invitation>> {
        Ok(self.invitations().find_one(doc! { "_id": id }).await?)
    }

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Vec<Invitation>> {
        let filter = doc! { "invitedUser": user_id, "status": InvitationStatus::Pending.as_str() };
        Ok(self.invitations().find(filter).await?.try_collect().await?)
    }

    async fn count_pending_for_user(&self, user_id: &str) -> StoreResult<u64> {
        let filter = doc! { "invitedUser": user_id, "status": InvitationStatus::Pending.as_str() };
        Ok(self.invitations().count_documents(filter).await?)
    }

    async fn find_pending_for_team(&self, team_id: &str) -> StoreResult<Vec<Invitation>> {
        let filter = doc! { "teamId": team_id, "status": InvitationStatus::Pending.as_str() };
        Ok(self.invitations().find(filter).await?.try_collect().await?)
    }

    async fn find_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<Vec<Invitation>> {
        let mut filter = doc! { "teamId": team_id };
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }
        Ok(self.invitations().find(filter).await?.try_collect().await?)
    }

    async fn transition(
        &self,
        id: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let filter = doc! { "_id": id, "status": from.as_str() };
        let update = doc! {
            "$set": { "status": to.as_str(), "respondedAt": to_bson(&responded_at)? }
        };
        let res = self.invitations().update_one(filter, update).await?;
        Ok(res.modified_count == 1)
    }

    async fn count_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<u64> {
        let mut filter: Document = doc! { "teamId": team_id };
        if let Some(status) = status {
            filter.insert("status", status.as_str());
        }
        Ok(self.invitations().count_documents(filter).await?)
    }

    async fn delete_for_team(&self, team_id: &str) -> StoreResult<u64> {
        let res = self.invitations().delete_many(doc! { "teamId": team_id }).await?;
        Ok(res.deleted_count)
    }
}
