//! Outcome notification.
//!
//! Each finished task produces at most one human-readable report. Delivery
//! happens only when email is enabled in configuration and the push carried
//! a pusher address; the configured notify address is the primary recipient
//! and the pusher is cc'd. Send failures are logged and absorbed — they must
//! never affect task completion or queue progression.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

use crate::pipeline::Stage;
use crate::queue::HookTask;
use crate::{Config, EmailConfig};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Outgoing report, independent of the delivery mechanism.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub cc: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Delivery seam. The production implementation speaks SMTP; tests record.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError>;
}

/// SMTP delivery via lettre, configured from the `[email]` table.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(email: &EmailConfig) -> Result<Self, NotifyError> {
        let builder = if email.tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&email.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&email.host)
        };
        let transport = builder
            .port(email.port)
            .credentials(Credentials::new(email.user.clone(), email.password.clone()))
            .build();

        Ok(SmtpMailer {
            transport,
            from: email.user.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(mail.to.parse()?)
            .subject(mail.subject);
        if let Some(cc) = mail.cc {
            builder = builder.cc(cc.parse()?);
        }
        let message = builder.body(mail.body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Sends outcome reports for finished tasks.
pub struct Notifier {
    config: Arc<Config>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl Notifier {
    pub fn new(config: Arc<Config>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Notifier { config, mailer }
    }

    /// Builds the production notifier. The SMTP transport is only
    /// constructed when email is enabled in configuration.
    pub fn from_config(config: Arc<Config>) -> Result<Self, NotifyError> {
        let mailer = match config.email.as_ref() {
            Some(email) if email.enabled => {
                Some(Arc::new(SmtpMailer::from_config(email)?) as Arc<dyn Mailer>)
            }
            _ => None,
        };
        Ok(Notifier::new(config, mailer))
    }

    pub async fn report_success(&self, task: &HookTask) {
        let site = format!("{}/{}", task.event.owner, task.event.repo);
        self.send(
            task,
            format!(
                "Your website at {site} was successfully published.{}",
                build_info(task)
            ),
            "Successfully published site",
        )
        .await;
    }

    pub async fn report_failure(&self, task: &HookTask, stage: Stage) {
        let site = format!("{}/{}", task.event.owner, task.event.repo);
        let (verb, subject) = match stage {
            Stage::Build => ("build", "Error building site"),
            Stage::Publish => ("publish", "Error publishing site"),
        };
        self.send(
            task,
            format!("Your website at {site} failed to {verb}.{}", build_info(task)),
            subject,
        )
        .await;
    }

    async fn send(&self, task: &HookTask, body: String, subject: &str) {
        let Some(mailer) = self.mailer.as_ref() else {
            return;
        };
        let Some(notify_email) = self.config.notify_email.as_ref() else {
            return;
        };
        let Some(pusher_email) = task.event.pusher_email.as_ref() else {
            info!("task {} - no pusher email on event, skipping report", task.id);
            return;
        };

        let mail = OutgoingMail {
            to: notify_email.clone(),
            cc: Some(pusher_email.clone()),
            subject: subject.to_string(),
            body,
        };
        if let Err(e) = mailer.send(mail).await {
            warn!("task {} - failed to send outcome report: {}", task.id, e);
        }
    }
}

/// Diagnostic tail appended to every report: the script parameters and the
/// original push payload.
fn build_info(task: &HookTask) -> String {
    let params = serde_json::to_string_pretty(&task.params.as_args()).unwrap_or_default();
    let payload = serde_json::to_string_pretty(&task.event.payload).unwrap_or_default();
    format!("\r\nparams: \r\n{params}\r\nGitHub payload: \r\n{payload}")
}
