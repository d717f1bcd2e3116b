//! In-memory store for tests, with switches to simulate write failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{InvitationStore, StoreError, StoreResult, TaskStore, TeamStore, UserStore};
use crate::models::{
    Comment, Invitation, InvitationStatus, ProfileChanges, Task, TaskChanges, Team, User,
};

#[derive(Default)]
struct State {
    tasks: Vec<Task>,
    users: Vec<User>,
    teams: HashMap<String, Team>,
    invitations: Vec<Invitation>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pub fail_mark_notified: AtomicBool,
    pub fail_add_member: AtomicBool,
    pub fail_task_queries: AtomicBool,
    pub fail_invitation_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{what} failed")))
        } else {
            Ok(())
        }
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn team(&self, id: &str) -> Option<Team> {
        self.lock().teams.get(id).cloned()
    }

    pub fn invitation(&self, id: &str) -> Option<Invitation> {
        self.lock().invitations.iter().find(|i| i.id == id).cloned()
    }

    pub fn invitations(&self) -> Vec<Invitation> {
        self.lock().invitations.clone()
    }

    pub fn seed_user(&self, username: &str, email: &str) -> User {
        let user = User::new(username.to_string(), email.to_string(), String::new());
        self.lock().users.push(user.clone());
        user
    }

    pub fn seed_task(&self, task: Task) -> Task {
        self.lock().tasks.push(task.clone());
        task
    }

    pub fn seed_team(&self, name: &str, members: &[&User]) -> Team {
        let mut team = Team::new(name.to_string(), members[0].id.clone());
        team.members = members.iter().map(|u| u.id.clone()).collect();
        self.lock().teams.insert(team.id.clone(), team.clone());
        team
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.lock().tasks.push(task.clone());
        Ok(())
    }

    async fn find_task(&self, id: &str) -> StoreResult<Option<Task>> {
        Ok(self.task(id))
    }

    async fn find_unnotified_incomplete(&self) -> StoreResult<Vec<Task>> {
        Self::check(&self.fail_task_queries, "task query")?;
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| !t.complete && !t.overdue_notified)
            .cloned()
            .collect())
    }

    async fn find_tasks_assigned_to(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        Self::check(&self.fail_task_queries, "task query")?;
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.is_assigned_to(user_id))
            .cloned()
            .collect())
    }

    async fn find_team_tasks(&self, team_id: &str) -> StoreResult<Vec<Task>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .filter(|t| t.team_id.as_deref() == Some(team_id))
            .cloned()
            .collect())
    }

    async fn set_complete(
        &self,
        id: &str,
        complete: bool,
        completed_by: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.complete = complete;
                task.completed_by = completed_by.map(str::to_string);
                true
            }
            None => false,
        })
    }

    async fn update_task(&self, id: &str, changes: &TaskChanges) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                changes.apply(task);
                task.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_important(&self, id: &str, important: bool) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.important = important;
                true
            }
            None => false,
        })
    }

    async fn mark_overdue_notified(&self, id: &str) -> StoreResult<bool> {
        Self::check(&self.fail_mark_notified, "mark overdue")?;
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == id && !t.overdue_notified) {
            Some(task) => {
                task.overdue_notified = true;
                true
            }
            None => false,
        })
    }

    async fn push_comment(&self, task_id: &str, comment: &Comment) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                task.comments.push(comment.clone());
                true
            }
            None => false,
        })
    }

    async fn pull_comment(&self, task_id: &str, comment_id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.tasks.iter_mut().find(|t| t.id == task_id) {
            Some(task) => {
                let before = task.comments.len();
                task.comments.retain(|c| c.id != comment_id);
                task.comments.len() != before
            }
            None => false,
        })
    }

    async fn delete_task(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != id);
        Ok(state.tasks.len() != before)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.lock().users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users_by_emails(&self, emails: &[String]) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| emails.contains(&u.email))
            .cloned()
            .collect())
    }

    async fn find_users_by_ids(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                if let Some(username) = &changes.username {
                    user.username = username.clone();
                }
                if let Some(email) = &changes.email {
                    user.email = email.clone();
                }
                if let Some(hash) = &changes.password_hash {
                    user.password_hash = hash.clone();
                }
                true
            }
            None => false,
        })
    }

    async fn push_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == user_id) {
            if !user.tasks.iter().any(|t| t == task_id) {
                user.tasks.push(task_id.to_string());
            }
        }
        Ok(())
    }

    async fn pull_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        if let Some(user) = self.lock().users.iter_mut().find(|u| u.id == user_id) {
            user.tasks.retain(|t| t != task_id);
        }
        Ok(())
    }
}

#[async_trait]
impl TeamStore for MemoryStore {
    async fn insert_team(&self, team: &Team) -> StoreResult<()> {
        self.lock().teams.insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn find_team(&self, id: &str) -> StoreResult<Option<Team>> {
        Ok(self.team(id))
    }

    async fn find_teams_with_member(&self, user_id: &str) -> StoreResult<Vec<Team>> {
        Ok(self
            .lock()
            .teams
            .values()
            .filter(|t| t.is_member(user_id))
            .cloned()
            .collect())
    }

    async fn add_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool> {
        Self::check(&self.fail_add_member, "add member")?;
        let mut state = self.lock();
        Ok(match state.teams.get_mut(team_id) {
            Some(team) => {
                if !team.is_member(user_id) {
                    team.members.push(user_id.to_string());
                }
                true
            }
            None => false,
        })
    }

    async fn remove_member(&self, team_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.teams.get_mut(team_id) {
            Some(team) => {
                let before = team.members.len();
                team.members.retain(|m| m != user_id);
                team.members.len() != before
            }
            None => false,
        })
    }

    async fn delete_team(&self, id: &str) -> StoreResult<bool> {
        Ok(self.lock().teams.remove(id).is_some())
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert_invitations(&self, invitations: &[Invitation]) -> StoreResult<()> {
        Self::check(&self.fail_invitation_writes, "insert invitations")?;
        self.lock().invitations.extend_from_slice(invitations);
        Ok(())
    }

    async fn find_invitation(&self, id: &str) -> StoreResult<Option<Invitation>> {
        Ok(self.invitation(id))
    }

    async fn find_pending_for_user(&self, user_id: &str) -> StoreResult<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|i| i.invited_user == user_id && i.status == InvitationStatus::Pending)
            .cloned()
            .collect())
    }

    async fn count_pending_for_user(&self, user_id: &str) -> StoreResult<u64> {
        Ok(self.find_pending_for_user(user_id).await?.len() as u64)
    }

    async fn find_pending_for_team(&self, team_id: &str) -> StoreResult<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|i| i.team_id == team_id && i.status == InvitationStatus::Pending)
            .cloned()
            .collect())
    }

    async fn find_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<Vec<Invitation>> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|i| i.team_id == team_id && status.map_or(true, |s| i.status == s))
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: &str,
        from: InvitationStatus,
        to: InvitationStatus,
        responded_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        Ok(match state.invitations.iter_mut().find(|i| i.id == id && i.status == from) {
            Some(invitation) => {
                invitation.status = to;
                invitation.responded_at = responded_at;
                true
            }
            None => false,
        })
    }

    async fn count_for_team(
        &self,
        team_id: &str,
        status: Option<InvitationStatus>,
    ) -> StoreResult<u64> {
        Ok(self
            .lock()
            .invitations
            .iter()
            .filter(|i| i.team_id == team_id && status.map_or(true, |s| i.status == s))
            .count() as u64)
    }

    async fn delete_for_team(&self, team_id: &str) -> StoreResult<u64> {
        Self::check(&self.fail_invitation_writes, "delete invitations")?;
        let mut state = self.lock();
        let before = state.invitations.len();
        state.invitations.retain(|i| i.team_id != team_id);
        Ok((before - state.invitations.len()) as u64)
    }
}
