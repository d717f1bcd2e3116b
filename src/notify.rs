//! Outbound notifications.
//!
//! Delivery is fire-and-forget from the caller's point of view: `dispatch`
//! logs a failed send and returns, so no mutation is ever rolled back because
//! an email could not go out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Notification {
            to,
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn single(to: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(vec![to.to_string()], subject, body)
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("notification has no recipients")]
    NoRecipients,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), MailError>;
}

/// Sends and swallows the error after logging it.
pub async fn dispatch(mailer: &dyn Mailer, notification: Notification) {
    if notification.to.is_empty() {
        return;
    }
    if let Err(e) = mailer.send(&notification).await {
        error!(
            "Failed to send \"{}\" to {:?}: {}",
            notification.subject, notification.to, e
        );
    }
}

/// Writes outgoing mail to the log. Used in development.
pub struct ConsoleMailer {
    from: String,
}

impl ConsoleMailer {
    pub fn new(from: &str) -> Self {
        ConsoleMailer {
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        if notification.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        info!(
            "Email from {} to {:?}: {}\n{}",
            self.from, notification.to, notification.subject, notification.body
        );
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub queued_at: DateTime<Utc>,
}

/// Queues mail in the `outbox` collection for an external relay to deliver.
pub struct OutboxMailer {
    from: String,
    outbox: Collection<OutboxEntry>,
}

impl OutboxMailer {
    pub fn new(db: &Database, from: &str) -> Self {
        OutboxMailer {
            from: from.to_string(),
            outbox: db.collection::<OutboxEntry>("outbox"),
        }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailError> {
        if notification.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        let entry = OutboxEntry {
            id: crate::models::new_id(),
            from: self.from.clone(),
            to: notification.to.clone(),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
            queued_at: Utc::now(),
        };
        self.outbox
            .insert_one(&entry)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(())
    }
}

pub type SharedMailer = Arc<dyn Mailer>;
