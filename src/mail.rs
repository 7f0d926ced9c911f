use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;

/// Outbound email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// SMTP mailer. Without a configured host it only logs what it would send.
pub struct SmtpMailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let from = cfg
            .from
            .parse::<Mailbox>()
            .context("invalid SMTP_FROM address")?;

        let transport = if cfg.host.trim().is_empty() {
            warn!("SMTP_HOST not configured; mailer running in log-only mode");
            None
        } else {
            let builder = if cfg.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            }
            .context("configure SMTP transport")?
            .port(cfg.port);

            let builder = match (&cfg.username, &cfg.password) {
                (Some(user), Some(pass)) => {
                    builder.credentials(Credentials::new(user.clone(), pass.clone()))
                }
                _ => builder,
            };
            Some(builder.build())
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let Some(transport) = &self.transport else {
            info!(subject, "mailer in log-only mode; skipping send");
            return Ok(());
        };

        let recipient = to.parse::<Mailbox>().context("invalid recipient address")?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email message")?;

        transport.send(email).await.context("send email")?;
        info!(subject, "email sent");
        Ok(())
    }
}
