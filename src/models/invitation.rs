use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "Pending",
            InvitationStatus::Accepted => "Accepted",
            InvitationStatus::Rejected => "Rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }
}

/// The answer an invited user can give. Pending is not a valid answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Accepted,
    Rejected,
}

impl From<Decision> for InvitationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => InvitationStatus::Accepted,
            Decision::Rejected => InvitationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(rename = "_id")]
    pub id: String,
    pub team_id: String,
    pub invited_user: String,
    pub invited_by: String,
    #[serde(default)]
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn pending(team_id: &str, invited_user: &str, invited_by: &str) -> Self {
        Invitation {
            id: super::new_id(),
            team_id: team_id.to_string(),
            invited_user: invited_user.to_string(),
            invited_by: invited_by.to_string(),
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        }
    }
}

/// Pending invitation as shown to the invited user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInvitation {
    pub id: String,
    pub team_id: String,
    pub team_name: String,
    pub invited_by: String,
    pub invited_by_email: Option<String>,
    pub created_at: DateTime<Utc>,
}
