//! Optional SMTP admin-alert notifier, adapted from the teacher's
//! `EmailNotifier`: same transport setup (`lettre`'s async SMTP transport,
//! STARTTLS or plain depending on config), alerts now cover a pile going
//! `OFFLINE`/recovering instead of a solar instance.

use anyhow::{Context, Result};
use ev_shared::PileId;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};

use crate::config::AlertConfig;

#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    admin_recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(config: &AlertConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .with_context(|| format!("invalid from_address: {}", config.from_address))?;

        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .with_context(|| format!("failed to create SMTP relay: {}", config.smtp_host))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport,
            from,
            admin_recipients: config.admin_recipients.clone(),
        })
    }

    pub async fn send_offline_alert(&self, pile_id: &PileId) -> Result<()> {
        let subject = format!("Charging station alert: pile {pile_id} is offline");
        let body = format!(
            "Pile {pile_id} has not sent a heartbeat within the configured timeout and has \
             been marked OFFLINE. It is excluded from dispatch until its heartbeat resumes \
             or an admin clears the fault."
        );
        self.send_to_all(&subject, &body).await
    }

    pub async fn send_recovery_alert(&self, pile_id: &PileId) -> Result<()> {
        let subject = format!("Charging station recovery: pile {pile_id} is back online");
        let body = format!("Pile {pile_id} resumed sending heartbeats and is back in service.");
        self.send_to_all(&subject, &body).await
    }

    async fn send_to_all(&self, subject: &str, body: &str) -> Result<()> {
        for recipient in &self.admin_recipients {
            let to: Mailbox = match recipient.parse() {
                Ok(m) => m,
                Err(e) => {
                    error!(recipient = %recipient, error = %e, "Invalid recipient address, skipping");
                    continue;
                }
            };

            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_owned())
                .context("failed to build email message")?;

            match self.transport.send(message).await {
                Ok(_) => info!(recipient = %recipient, subject = %subject, "Alert email sent"),
                Err(e) => error!(recipient = %recipient, error = %e, "Failed to send alert email"),
            }
        }
        Ok(())
    }
}
