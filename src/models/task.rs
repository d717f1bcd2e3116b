use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Sort key, higher is more urgent.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A task document. `due_date`/`due_time` stay as the text the client sent;
/// they are only interpreted when checking lateness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub complete: bool,
    /// Who last marked the task complete. Cleared when it is reopened.
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub assigned_users: Vec<String>,
    #[serde(default)]
    pub overdue_notified: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: String, description: String, assigned_users: Vec<String>) -> Self {
        let now = Utc::now();
        Task {
            id: super::new_id(),
            title,
            description,
            important: false,
            complete: false,
            completed_by: None,
            priority: Priority::default(),
            due_date: None,
            due_time: None,
            team_id: None,
            assigned_users,
            overdue_notified: false,
            comments: Vec::new(),
            attachment: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_due(mut self, date: &str, time: &str) -> Self {
        self.due_date = Some(date.to_string());
        self.due_time = Some(time.to_string());
        self
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assigned_users.iter().any(|u| u == user_id)
    }
}

/// An edit to a task's content. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChanges {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "desc")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub due_time: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        *self == TaskChanges::default()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(date) = &self.due_date {
            task.due_date = Some(date.clone());
        }
        if let Some(time) = &self.due_time {
            task.due_time = Some(time.clone());
        }
        if let Some(attachment) = &self.attachment {
            task.attachment = Some(attachment.clone());
        }
    }
}
