// team_management.rs

use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ServiceError;
use crate::models::{Decision, Invitation, Team};

// ─── REQUEST PAYLOADS ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    #[serde(default)]
    pub inviter_user_id: Option<String>,
    #[serde(alias = "emails")]
    pub candidate_emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    #[serde(alias = "response")]
    pub decision: Decision,
}

#[derive(Debug, Serialize)]
pub struct CreateTeamResponse {
    pub team: Team,
    pub invitations: Vec<Invitation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCount {
    pub pending_count: u64,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// Path user ids must match the caller.
fn ensure_self(caller: &str, user_id: &str) -> Result<(), ServiceError> {
    if caller != user_id {
        return Err(ServiceError::Forbidden(
            "Cannot access another user's data".to_string(),
        ));
    }
    Ok(())
}

// ─── TEAMS ────────────────────────────────────────────────────────────────────

// POST /teams
pub async fn create_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTeamRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    debug!("create_team called with payload: {:?}", payload);
    let (team, invitations) = data
        .membership
        .create_team(&payload.name, &caller, &payload.members)
        .await?;
    Ok(HttpResponse::Created().json(CreateTeamResponse { team, invitations }))
}

// GET /teams/{team_id}
pub async fn get_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;
    Ok(HttpResponse::Ok().json(team))
}

// DELETE /teams/{team_id}
pub async fn delete_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    data.membership.delete_team(&team_id, &caller).await?;
    Ok(HttpResponse::Ok().json(Message {
        message: "Team deleted successfully",
    }))
}

// DELETE /teams/{team_id}/leave
pub async fn leave_team(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    data.membership.leave_team(&team_id, &caller).await?;
    Ok(HttpResponse::Ok().json(Message {
        message: "You have left the team",
    }))
}

// GET /users/{user_id}/teams
pub async fn get_user_teams(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    ensure_self(&caller, &user_id)?;
    let teams = data.membership.teams_of(&user_id).await?;
    Ok(HttpResponse::Ok().json(teams))
}

// ─── INVITATIONS ──────────────────────────────────────────────────────────────

// POST /teams/{team_id}/invite
pub async fn invite_members(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
    payload: web::Json<InviteRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    if let Some(inviter) = payload.inviter_user_id.as_deref() {
        ensure_self(&caller, inviter)?;
    }
    let invitations = data
        .membership
        .create_invitations(&team_id, &caller, &payload.candidate_emails)
        .await?;
    Ok(HttpResponse::Ok().json(invitations))
}

// POST /invitations/{invitation_id}/respond
pub async fn respond_to_invitation(
    req: HttpRequest,
    data: web::Data<AppState>,
    invitation_id: web::Path<String>,
    payload: web::Json<RespondRequest>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let invitation = data
        .membership
        .respond(&invitation_id, &caller, payload.decision)
        .await?;
    Ok(HttpResponse::Ok().json(invitation))
}

// GET /users/{user_id}/invitations
pub async fn get_pending_invitations(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    ensure_self(&caller, &user_id)?;
    let pending = data.membership.list_pending(&user_id).await?;
    Ok(HttpResponse::Ok().json(pending))
}

// GET /users/{user_id}/invitations/count
pub async fn count_pending_invitations(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    ensure_self(&caller, &user_id)?;
    let pending_count = data.membership.count_pending(&user_id).await?;
    Ok(HttpResponse::Ok().json(PendingCount { pending_count }))
}
