//! Overdue task detection.
//!
//! A sweep loads every incomplete, not-yet-notified task, works out which of
//! them are past due in the reference zone, mails each assignee once and then
//! flags the task so later sweeps leave it alone. Each task is handled on its
//! own; one bad task never stops the rest of the sweep.

pub mod due;
pub mod scheduler;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::models::Task;
use crate::notify::{Mailer, Notification};
use crate::store::{StoreResult, TaskStore, UserStore};
use due::{DueState, ReferenceZone};

/// Ordering of "send mail" and "persist flag".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Send first, then flag. A failed flag write means the mail goes out again
    /// next sweep.
    #[default]
    AtLeastOnce,
    /// Flag first, then send. A failed send is never retried.
    AtMostOnce,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at_least_once" | "at-least-once" => Ok(DeliveryMode::AtLeastOnce),
            "at_most_once" | "at-most-once" => Ok(DeliveryMode::AtMostOnce),
            other => Err(format!("unknown delivery mode {other:?}")),
        }
    }
}

/// What happened to one candidate task during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Notified { delivered: usize, failed: usize },
    NotDue,
    MissingDue,
    InvalidDue,
    NoAssignees,
    NoRecipients,
    /// Another sweep flagged the task first.
    AlreadyFlagged,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub notified: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Notified { .. } => self.notified += 1,
            Outcome::Failed(_) => self.failed += 1,
            _ => self.skipped += 1,
        }
    }
}

pub struct OverdueDetector {
    tasks: Arc<dyn TaskStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    zone: ReferenceZone,
    mode: DeliveryMode,
}

impl OverdueDetector {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        zone: ReferenceZone,
        mode: DeliveryMode,
    ) -> Self {
        OverdueDetector {
            tasks,
            users,
            mailer,
            zone,
            mode,
        }
    }

    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        debug!("Checking for overdue tasks at {}", self.zone.localize(now));
        let candidates = self.tasks.find_unnotified_incomplete().await?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for task in &candidates {
            let outcome = self.process(task, now).await;
            if let Outcome::Failed(reason) = &outcome {
                error!("Overdue check failed for task \"{}\" ({}): {}", task.title, task.id, reason);
            }
            report.record(&outcome);
        }

        info!(
            "Overdue check completed: {} candidates, {} notified, {} skipped, {} failed",
            report.candidates, report.notified, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn process(&self, task: &Task, now: DateTime<Utc>) -> Outcome {
        match due::evaluate(task, self.zone, now) {
            DueState::Missing => {
                warn!("Task \"{}\" ({}) missing dueDate/dueTime, skipping", task.title, task.id);
                return Outcome::MissingDue;
            }
            DueState::Invalid(e) => {
                warn!("Task \"{}\" ({}) has an unusable due date: {}", task.title, task.id, e);
                return Outcome::InvalidDue;
            }
            DueState::Upcoming(_) => return Outcome::NotDue,
            DueState::Overdue(due) => {
                info!("Task \"{}\" ({}) is overdue since {}", task.title, task.id, due);
            }
        }

        if task.assigned_users.is_empty() {
            error!("Task \"{}\" ({}) has no assigned users, skipping", task.title, task.id);
            return Outcome::NoAssignees;
        }

        let emails = match self.users.find_users_by_ids(&task.assigned_users).await {
            Ok(users) => users
                .into_iter()
                .map(|u| u.email)
                .filter(|e| !e.trim().is_empty())
                .collect::<Vec<_>>(),
            Err(e) => return Outcome::Failed(format!("resolving assignees: {e}")),
        };
        if emails.is_empty() {
            error!("No valid emails found for task \"{}\" ({}), skipping", task.title, task.id);
            return Outcome::NoRecipients;
        }

        match self.mode {
            DeliveryMode::AtLeastOnce => {
                let (delivered, failed) = self.notify_all(task, &emails).await;
                match self.tasks.mark_overdue_notified(&task.id).await {
                    Ok(true) => Outcome::Notified { delivered, failed },
                    Ok(false) => {
                        debug!("Task {} was flagged concurrently", task.id);
                        Outcome::Notified { delivered, failed }
                    }
                    Err(e) => Outcome::Failed(format!("flag not persisted, will retry: {e}")),
                }
            }
            DeliveryMode::AtMostOnce => match self.tasks.mark_overdue_notified(&task.id).await {
                Ok(true) => {
                    let (delivered, failed) = self.notify_all(task, &emails).await;
                    Outcome::Notified { delivered, failed }
                }
                Ok(false) => Outcome::AlreadyFlagged,
                Err(e) => Outcome::Failed(format!("flag not persisted, not sending: {e}")),
            },
        }
    }

    /// One mail per address. Every address is attempted even if some fail.
    async fn notify_all(&self, task: &Task, emails: &[String]) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;
        for email in emails {
            let notification = Notification::single(
                email,
                format!("Task Overdue: {}", task.title),
                format!(
                    "Your task \"{}\" is overdue! Please complete it ASAP.",
                    task.title
                ),
            );
            match self.mailer.send(&notification).await {
                Ok(()) => {
                    info!("Overdue email sent to {} for task: {}", email, task.title);
                    delivered += 1;
                }
                Err(e) => {
                    error!("Failed to send overdue email to {} for task \"{}\": {}", email, task.title, e);
                    failed += 1;
                }
            }
        }
        (delivered, failed)
    }
}
