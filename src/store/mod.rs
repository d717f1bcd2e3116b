//! Repository traits over the document store.
//!
//! Each entity gets its own trait so services only see the queries they use.
//! Array and flag mutations are expressed as single conditional updates
//! (`$addToSet`, `$pull`, filtered `$set`) instead of read-modify-write.

pub mod mongo;
#[cfg(test)]
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Comment, Invitation, InvitationStatus, ProfileChanges, Task, TaskChanges, Team, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] mongodb::bson::ser::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> StoreResult<()>;

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>>;

    /// Tasks with `complete = false AND overdueNotified = false`.
    async fn find_unnotified_incomplete(&self) -> StoreResult<Vec<Task>>;

    async fn find_tasks_assigned_to(&self, user_id: &str) -> StoreResult<Vec<Task>>;

    async fn find_team_tasks(&self, team_id: &str) -> StoreResult<Vec<Task>>;

    /// Returns false when no task matched. `completed_by` is stored as given,
    /// so reopening passes `None`.
    async fn set_complete(
        &self,
        id: &str,
        complete: bool,
        completed_by: Option<&str>,
    ) -> StoreResult<bool>;

    /// Overwrites the fields set in `changes`. Never touches `overdueNotified`.
    async fn update_task(&self, id: &str, changes: &TaskChanges) -> StoreResult<bool>;

    async fn set_important(&self, id: &str, important: bool) -> StoreResult<bool>;

    /// Flips `overdueNotified` from false to true. Returns true only for the
    /// caller that performed the transition.
    async fn mark_overdue_notified(&self, id: &str) -> StoreResult<bool>;

    async fn push_comment(&self, task_id: &str, comment: &Comment) -> StoreResult<bool>;

    async fn pull_comment(&self, task_id: &str, comment_id: &str) -> StoreResult<bool>;

    async fn delete_task(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_users_by_emails(&self, emails: &[String]) -> StoreResult<Vec<User>>;

    async fn find_users_by_ids(&self, ids: &[String]) -> StoreResult<Vec<User>>;

    async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> StoreResult<bool>;

    async fn push_task(&self, user_id: &str, task_id: &str) -> StoreResult<()>;

    async fn pull_task(&self, user_id: &str, task_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn insert_team(&self, team: &Team) -> StoreResult<()>;

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>>;

    async fn find_teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>>;

    /// Adds the user unless already present. Returns false when the team is gone.
    async fn add_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool>;

    async fn remove_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool>;

    async fn delete_team(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert_invitations(&self, invitations: &[Invitation]) -> StoreResult<()>;

    async fn find_invitation(&self, id: &str) -> StoreResult<Option<Invitation>>;

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Vec<Invitation>>;

    async fn count_pending_for_user(&self, user_id: &str) -> StoreResult<u64>;

    async fn find_pending_for_team(&self, team_id: &str) -> StoreResult<Vec<Invitation>>;

    async fn find_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<Vec<Invitation>>;

    /// Moves an invitation from `from` to `to` only if it is still in `from`.
    async fn transition(
        &self,
        id: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    /// Counts a team's invitations, optionally restricted to one status.
    async fn count_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<u64>;

    async fn delete_for_team(&self, team_id: &str) -> StoreResult<u64>;
}

/// Shared handles to every repository.
#[derive(Clone)]
pub struct Repositories {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub teams: Arc<dyn TeamStore>,
    pub invitations: Arc<dyn InvitationStore>,
}

impl Repositories {
    /// One backing store serving all four repositories.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TaskStore + UserStore + TeamStore + InvitationStore + 'static,
    {
        Repositories {
            tasks: store.clone(),
            users: store.clone(),
            teams: store.clone(),
            invitations: store,
        }
    }
}
