use std::collections::BTreeMap;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ServiceError;
use crate::models::InvitationStatus;

/// Invitation totals for one team.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamActivity {
    pub total_invites: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub pending: u64,
}

// GET /teams/{team_id}/activity
pub async fn team_activity(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;

    let invitations = &data.repos.invitations;
    let activity = TeamActivity {
        total_invites: invitations.count_for_team(&team.id, None).await?,
        accepted: invitations
            .count_for_team(&team.id, Some(InvitationStatus::Accepted))
            .await?,
        rejected: invitations
            .count_for_team(&team.id, Some(InvitationStatus::Rejected))
            .await?,
        pending: invitations
            .count_for_team(&team.id, Some(InvitationStatus::Pending))
            .await?,
    };
    Ok(HttpResponse::Ok().json(activity))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberActivity {
    pub user_id: String,
    pub tasks_completed: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participation {
    pub member_activity: Vec<MemberActivity>,
}

/// Members who joined on one calendar day of the reference zone.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct GrowthPoint {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Growth {
    pub growth_stats: Vec<GrowthPoint>,
}

// GET /teams/{team_id}/participation
pub async fn team_participation(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;

    let mut completed: BTreeMap<String, u64> = BTreeMap::new();
    for task in data.repos.tasks.find_team_tasks(&team.id).await? {
        if let (true, Some(user_id)) = (task.complete, task.completed_by) {
            *completed.entry(user_id).or_default() += 1;
        }
    }
    let mut member_activity: Vec<MemberActivity> = completed
        .into_iter()
        .map(|(user_id, tasks_completed)| MemberActivity { user_id, tasks_completed })
        .collect();
    member_activity.sort_by(|a, b| b.tasks_completed.cmp(&a.tasks_completed));

    Ok(HttpResponse::Ok().json(Participation { member_activity }))
}

// GET /teams/{team_id}/growth
pub async fn team_growth(
    req: HttpRequest,
    data: web::Data<AppState>,
    team_id: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let caller = current_user(&req)?;
    let team = data.membership.get_team(&team_id, &caller).await?;
    let zone = data.config.reference_zone;
    let day = |at: DateTime<Utc>| zone.localize(at).format("%Y-%m-%d").to_string();

    // The creator joins when the team is made, everyone else on acceptance.
    let mut joins: BTreeMap<String, u64> = BTreeMap::new();
    *joins.entry(day(team.created_at)).or_default() += 1;
    let accepted = data
        .repos
        .invitations
        .find_for_team(&team.id, Some(InvitationStatus::Accepted))
        .await?;
    for invitation in accepted {
        if let Some(at) = invitation.responded_at {
            *joins.entry(day(at)).or_default() += 1;
        }
    }

    let growth_stats = joins
        .into_iter()
        .map(|(date, count)| GrowthPoint { date, count })
        .collect();
    Ok(HttpResponse::Ok().json(Growth { growth_stats }))
}
