//! Team membership and the invitation lifecycle.
//!
//! Invitations start Pending and move to Accepted or Rejected exactly once.
//! Team membership only grows through an accepted invitation and only shrinks
//! through leaving. Every validation and authorization check happens before
//! the first write.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};

use crate::error::ServiceError;
use crate::models::{Decision, Invitation, InvitationStatus, PendingInvitation, Team, User};
use crate::notify::{dispatch, Mailer, Notification};
use crate::store::{InvitationStore, Repositories, TeamStore, UserStore};

/// What to do when a candidate already has a Pending invitation to the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Issue another invitation anyway.
    #[default]
    Allow,
    /// Leave the existing invitation as the only one.
    SkipPending,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DuplicatePolicy::Allow),
            "skip_pending" | "skip-pending" => Ok(DuplicatePolicy::SkipPending),
            other => Err(format!("unknown duplicate invitation policy {other:?}")),
        }
    }
}

pub struct MembershipService {
    users: Arc<dyn UserStore>,
    teams: Arc<dyn TeamStore>,
    invitations: Arc<dyn InvitationStore>,
    mailer: Arc<dyn Mailer>,
    duplicates: DuplicatePolicy,
}

impl MembershipService {
    pub fn new(repos: &Repositories, mailer: Arc<dyn Mailer>, duplicates: DuplicatePolicy) -> Self {
        MembershipService {
            users: repos.users.clone(),
            teams: repos.teams.clone(),
            invitations: repos.invitations.clone(),
            mailer,
            duplicates,
        }
    }

    async fn load_team(&self, team_id: &str) -> Result<Team, ServiceError> {
        self.teams
            .find_team(team_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Team not found".to_string()))
    }

    /// Resolves every email to a user, failing if any one is unknown.
    async fn resolve_emails(&self, emails: &[String]) -> Result<Vec<User>, ServiceError> {
        let mut seen = HashSet::new();
        let wanted: Vec<String> = emails
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect();
        let users = self.users.find_users_by_emails(&wanted).await?;
        let missing: Vec<&str> = wanted
            .iter()
            .filter(|e| !users.iter().any(|u| &u.email == *e))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "One or more users not found: {}",
                missing.join(", ")
            )));
        }
        Ok(users)
    }

    /// Creates a team with `creator_id` as its only member, then invites
    /// `member_emails`. Unknown emails fail the call before anything is written.
    pub async fn create_team(
        &self,
        name: &str,
        creator_id: &str,
        member_emails: &[String],
    ) -> Result<(Team, Vec<Invitation>), ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("Team name is required".to_string()));
        }
        let creator = self
            .users
            .find_user(creator_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let others: Vec<String> = member_emails
            .iter()
            .filter(|e| !e.trim().is_empty() && e.trim() != creator.email)
            .cloned()
            .collect();

        let team = Team::new(name.to_string(), creator.id.clone());
        let invitees = if others.is_empty() {
            Vec::new()
        } else {
            self.invitees_for(&team, &others).await?
        };

        self.teams.insert_team(&team).await?;
        info!("Team \"{}\" ({}) created by {}", team.name, team.id, creator.id);

        if invitees.is_empty() {
            return Ok((team, Vec::new()));
        }
        match self.issue_invitations(&team, &creator.id, invitees).await {
            Ok(invitations) => Ok((team, invitations)),
            Err(e) => {
                if let Err(cleanup) = self.teams.delete_team(&team.id).await {
                    error!("Team {} left without its invitations: {}", team.id, cleanup);
                }
                Err(e)
            }
        }
    }

    pub async fn create_invitations(
        &self,
        team_id: &str,
        inviter_id: &str,
        candidate_emails: &[String],
    ) -> Result<Vec<Invitation>, ServiceError> {
        let team = self.load_team(team_id).await?;
        if !team.is_member(inviter_id) {
            return Err(ServiceError::Forbidden(
                "You are not authorized to invite members".to_string(),
            ));
        }
        if candidate_emails.iter().all(|e| e.trim().is_empty()) {
            return Err(ServiceError::BadRequest(
                "At least one member email is required".to_string(),
            ));
        }
        let invitees = self.invitees_for(&team, candidate_emails).await?;
        self.issue_invitations(&team, inviter_id, invitees).await
    }

    /// Users behind `emails` who still need an invitation to `team`.
    /// Fails with BadRequest when that leaves nobody.
    async fn invitees_for(&self, team: &Team, emails: &[String]) -> Result<Vec<User>, ServiceError> {
        let users = self.resolve_emails(emails).await?;
        let mut invitees: Vec<User> = users.into_iter().filter(|u| !team.is_member(&u.id)).collect();

        if self.duplicates == DuplicatePolicy::SkipPending && !invitees.is_empty() {
            let pending = self.invitations.find_pending_for_team(&team.id).await?;
            invitees.retain(|u| !pending.iter().any(|i| i.invited_user == u.id));
        }

        if invitees.is_empty() {
            return Err(ServiceError::BadRequest(
                "Users are already in the team".to_string(),
            ));
        }
        Ok(invitees)
    }

    async fn issue_invitations(
        &self,
        team: &Team,
        inviter_id: &str,
        invitees: Vec<User>,
    ) -> Result<Vec<Invitation>, ServiceError> {
        let invitations: Vec<Invitation> = invitees
            .iter()
            .map(|u| Invitation::pending(&team.id, &u.id, inviter_id))
            .collect();
        self.invitations.insert_invitations(&invitations).await?;
        info!("{} invitation(s) to team {} created by {}", invitations.len(), team.id, inviter_id);

        let emails = invitees.into_iter().map(|u| u.email).collect();
        dispatch(
            self.mailer.as_ref(),
            Notification::new(
                emails,
                "You've been invited to a team!",
                format!(
                    "Hello,\n\nYou have been invited to join the team \"{}\". Please accept the invitation to join.",
                    team.name
                ),
            ),
        )
        .await;

        Ok(invitations)
    }

    pub async fn respond(
        &self,
        invitation_id: &str,
        responder_id: &str,
        decision: Decision,
    ) -> Result<Invitation, ServiceError> {
        let mut invitation = self
            .invitations
            .find_invitation(invitation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;
        if invitation.invited_user != responder_id {
            warn!("User {} tried to answer invitation {} addressed to {}", responder_id, invitation.id, invitation.invited_user);
            return Err(ServiceError::Forbidden("Unauthorized".to_string()));
        }

        let team = self.load_team(&invitation.team_id).await?;
        let creator = self
            .users
            .find_user(team.creator_id())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Team creator not found".to_string()))?;

        if invitation.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Invitation already {}",
                invitation.status.as_str().to_lowercase()
            )));
        }

        let status = InvitationStatus::from(decision);
        let responded_at = Utc::now();
        let claimed = self
            .invitations
            .transition(&invitation.id, InvitationStatus::Pending, status, Some(responded_at))
            .await?;
        if !claimed {
            return Err(ServiceError::Conflict("Invitation already answered".to_string()));
        }

        if decision == Decision::Accepted {
            let joined = self.teams.add_member(&team.id, responder_id).await;
            if !matches!(joined, Ok(true)) {
                self.reopen(&invitation.id, status).await;
                return Err(match joined {
                    Err(e) => e.into(),
                    _ => ServiceError::NotFound("Team not found".to_string()),
                });
            }
        }

        invitation.status = status;
        invitation.responded_at = Some(responded_at);
        info!("Invitation {} {} by {}", invitation.id, status.as_str().to_lowercase(), responder_id);

        let member_name = match self.users.find_user(responder_id).await {
            Ok(Some(user)) => user.username,
            _ => responder_id.to_string(),
        };
        let verb = status.as_str().to_lowercase();
        dispatch(
            self.mailer.as_ref(),
            Notification::single(
                &creator.email,
                format!("Team Invitation {}!", status.as_str()),
                format!(
                    "Hello {},\n\n{} has {} your invitation to join the team \"{}\".\n\nBest regards,\nTeam Management",
                    creator.username, member_name, verb, team.name
                ),
            ),
        )
        .await;

        Ok(invitation)
    }

    /// Puts a claimed invitation back to Pending after the membership write failed.
    async fn reopen(&self, invitation_id: &str, claimed_as: InvitationStatus) {
        match self
            .invitations
            .transition(invitation_id, claimed_as, InvitationStatus::Pending, None)
            .await
        {
            Ok(true) => warn!("Invitation {} reopened after membership update failed", invitation_id),
            Ok(false) => error!("Invitation {} changed while reopening it", invitation_id),
            Err(e) => error!(
                "Invitation {} is {} but the user is not a member; reopening failed: {}",
                invitation_id,
                claimed_as.as_str(),
                e
            ),
        }
    }

    pub async fn count_pending(&self, user_id: &str) -> Result<u64, ServiceError> {
        Ok(self.invitations.count_pending_for_user(user_id).await?)
    }

    pub async fn list_pending(&self, user_id: &str) -> Result<Vec<PendingInvitation>, ServiceError> {
        let invitations = self.invitations.find_pending_for_user(user_id).await?;
        let inviter_ids: Vec<String> = invitations.iter().map(|i| i.invited_by.clone()).collect();
        let inviters = self.users.find_users_by_ids(&inviter_ids).await?;

        let mut pending = Vec::with_capacity(invitations.len());
        for invitation in invitations {
            let Some(team) = self.teams.find_team(&invitation.team_id).await? else {
                warn!("Pending invitation {} points at missing team {}", invitation.id, invitation.team_id);
                continue;
            };
            pending.push(PendingInvitation {
                invited_by_email: inviters
                    .iter()
                    .find(|u| u.id == invitation.invited_by)
                    .map(|u| u.email.clone()),
                id: invitation.id,
                team_id: team.id,
                team_name: team.name,
                invited_by: invitation.invited_by,
                created_at: invitation.created_at,
            });
        }
        Ok(pending)
    }

    pub async fn get_team(&self, team_id: &str, viewer_id: &str) -> Result<Team, ServiceError> {
        let team = self.load_team(team_id).await?;
        if !team.is_member(viewer_id) {
            return Err(ServiceError::Forbidden("You are not a member of this team".to_string()));
        }
        Ok(team)
    }

    pub async fn teams_of(&self, user_id: &str) -> Result<Vec<Team>, ServiceError> {
        Ok(self.teams.find_teams_with_member(user_id).await?)
    }

    pub async fn leave_team(&self, team_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let team = self.load_team(team_id).await?;
        if !team.is_member(user_id) {
            return Err(ServiceError::BadRequest("You are not a member of this team".to_string()));
        }
        self.teams.remove_member(&team.id, user_id).await?;
        info!("User {} left team {}", user_id, team.id);
        Ok(())
    }

    /// Invitations go first so a failure never leaves them pointing at a
    /// deleted team.
    pub async fn delete_team(&self, team_id: &str, requester_id: &str) -> Result<(), ServiceError> {
        let team = self.load_team(team_id).await?;
        if team.created_by != requester_id {
            return Err(ServiceError::Forbidden(
                "Only the team creator can delete this team".to_string(),
            ));
        }
        let members = self.users.find_users_by_ids(&team.members).await?;

        let dropped = self.invitations.delete_for_team(&team.id).await?;
        self.teams.delete_team(&team.id).await?;
        info!("Team {} deleted by {} ({} invitations removed)", team.id, requester_id, dropped);

        dispatch(
            self.mailer.as_ref(),
            Notification::new(
                members.into_iter().map(|u| u.email).collect(),
                "Team Deleted",
                format!(
                    "Hello,\n\nThe team \"{}\" has been deleted by the creator.",
                    team.name
                ),
            ),
        )
        .await;
        Ok(())
    }
}
