use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Who an email is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Something broke; goes to the developer contact
    Developer,
    /// Full run succeeded; goes to the notification list
    Success,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, subject: &str) -> Result<(), NotifyError>;
}

/// Emails the run log through the office SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    developer: Mailbox,
    success: Vec<Mailbox>,
    log_file: PathBuf,
}

impl SmtpNotifier {
    pub fn new(config: &Config) -> Self {
        // Internal relay: no TLS, no auth
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_host.clone())
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        Self {
            transport,
            from: config.reply_email_address.clone(),
            developer: config.dev_email_address.clone(),
            success: config.notification_email_addresses.clone(),
            log_file: config.log_file.clone(),
        }
    }

    fn recipients(&self, kind: NotificationKind) -> Vec<Mailbox> {
        match kind {
            NotificationKind::Developer => vec![self.developer.clone()],
            NotificationKind::Success => self.success.clone(),
        }
    }

    /// Build the email; the log is attached when it can be read
    pub fn build_message(
        &self,
        kind: NotificationKind,
        subject: &str,
        log: Option<Vec<u8>>,
    ) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .reply_to(self.from.clone())
            .subject(subject)
            .date_now();

        for to in self.recipients(kind) {
            builder = builder.to(to);
        }

        let body = format!(
            "<p>{}</p><p>Run finished {}. The run log is attached.</p>",
            escape_html(subject),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        let mut parts = MultiPart::mixed().singlepart(SinglePart::html(body));
        if let Some(log) = log {
            let file_name = self
                .log_file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "logfile.log".to_string());
            parts = parts.singlepart(Attachment::new(file_name).body(log, ContentType::TEXT_PLAIN));
        }

        Ok(builder.multipart(parts)?)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[instrument(skip(self))]
    async fn notify(&self, kind: NotificationKind, subject: &str) -> Result<(), NotifyError> {
        let log = match tokio::fs::read(&self.log_file).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(
                    "Could not read log file {} ({}), sending without attachment",
                    self.log_file.display(),
                    e
                );
                None
            }
        };

        let message = self.build_message(kind, subject, log)?;
        let response = self.transport.send(message).await?;
        debug!("SMTP response: {:?}", response.code());
        info!("Sent {:?} notification '{}'", kind, subject);
        Ok(())
    }
}

/// Used with `--no-email`: logs what would have been sent
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn notify(&self, kind: NotificationKind, subject: &str) -> Result<(), NotifyError> {
        info!("Email disabled; skipping {:?} notification '{}'", kind, subject);
        Ok(())
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
