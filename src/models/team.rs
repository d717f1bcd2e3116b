use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team. The creator starts as its only member but may later leave;
/// `created_by` keeps pointing at them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: String, creator_id: String) -> Self {
        Team {
            id: super::new_id(),
            name,
            members: vec![creator_id.clone()],
            created_by: creator_id,
            created_at: Utc::now(),
        }
    }

    pub fn creator_id(&self) -> &str {
        &self.created_by
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}
