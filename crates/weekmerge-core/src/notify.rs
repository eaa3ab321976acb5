use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use weekmerge_extracts::DatasetKind;

use crate::config::NotificationConfig;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification has no recipients")]
    NoRecipients,
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise notification: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub sender: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    fn addressed(config: &NotificationConfig, subject: String, body: String) -> Self {
        Self {
            sender: config.sender.clone(),
            recipients: config.recipients.clone(),
            cc: config.cc.clone(),
            bcc: config.bcc.clone(),
            subject,
            body,
            attachments: Vec::new(),
        }
    }

    pub fn success(config: &NotificationConfig, dataset: DatasetKind, body: String) -> Self {
        Self::addressed(
            config,
            format!("{} job completed successfully", dataset.display_name()),
            body,
        )
    }

    pub fn failure(config: &NotificationConfig, dataset: DatasetKind, error: &anyhow::Error) -> Self {
        Self::addressed(
            config,
            format!("Error in {} job", dataset.display_name()),
            format!(
                "An error occurred while processing the {} data: {error:#}",
                dataset.display_name()
            ),
        )
    }
}

/// Delivers run outcomes to people. Transports live outside this crate.
pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Emits notifications as log events only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            sender = %notification.sender,
            recipients = ?notification.recipients,
            subject = %notification.subject,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Drops each notification as a JSON file into a directory watched by a
/// mail relay.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        fs::create_dir_all(&self.dir).map_err(|source| NotifyError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(format!(
            "{}_{}.json",
            Local::now().format("%Y%m%d_%H%M%S"),
            Uuid::new_v4().simple()
        ));
        let payload = serde_json::to_vec_pretty(notification)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| NotifyError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(&payload)
            .and_then(|_| file.sync_all())
            .map_err(|source| NotifyError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), subject = %notification.subject, "notification queued");
        Ok(())
    }
}

pub fn notifier_from_config(config: &NotificationConfig) -> Box<dyn Notifier> {
    match &config.outbox_dir {
        Some(dir) => Box::new(OutboxNotifier::new(dir)),
        None => Box::new(LogNotifier),
    }
}
