// src/notify/email.rs
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::{Alert, ChannelConfig, Notifier, NotifyError};
use crate::config::{EMAIL_FROM, EMAIL_PASSWORD, EMAIL_TO, SMTP_PORT, SMTP_SERVER};

const SUBJECT: &str = "Stock Alert";
const DEFAULT_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP channel. The sender address doubles as the login user.
///
/// Addresses are parsed at send time so a malformed value surfaces as a
/// failed delivery for this channel instead of aborting startup.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    from: String,
    to: String,
    password: String,
    server: String,
    port: u16,
    timeout: Duration,
}

impl EmailNotifier {
    pub fn from_channel(cfg: &ChannelConfig, timeout: Duration) -> Self {
        let port = match cfg.credential(SMTP_PORT) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "invalid SMTP_PORT, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };
        Self {
            from: cfg.credential(EMAIL_FROM).unwrap_or_default().to_string(),
            to: cfg.credential(EMAIL_TO).unwrap_or_default().to_string(),
            password: cfg.credential(EMAIL_PASSWORD).unwrap_or_default().to_string(),
            server: cfg.credential(SMTP_SERVER).unwrap_or_default().to_string(),
            port,
            timeout,
        }
    }

    /// `EMAIL_TO` may list several addresses separated by commas.
    fn recipients(&self) -> Result<Vec<Mailbox>, NotifyError> {
        let to: Vec<Mailbox> = self
            .to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| {
                        NotifyError::Config(format!("invalid EMAIL_TO {addr:?}: {e}"))
                    })
            })
            .collect::<Result<_, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::Config("no recipients in EMAIL_TO".into()));
        }
        Ok(to)
    }

    fn build_message(&self, alert: &Alert) -> Result<Message, NotifyError> {
        let from: Mailbox = self.from.parse().map_err(|e: lettre::address::AddressError| {
            NotifyError::Config(format!("invalid EMAIL_FROM: {e}"))
        })?;

        let mut builder = Message::builder().from(from).subject(SUBJECT);
        for rcpt in self.recipients()? {
            builder = builder.to(rcpt);
        }
        builder
            .header(header::ContentType::TEXT_PLAIN)
            .body(alert.message.clone())
            .map_err(|e| NotifyError::Smtp(format!("build email: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.server)
        }
        .map_err(|e| NotifyError::Config(format!("invalid SMTP_SERVER: {e}")))?;

        Ok(builder
            .port(self.port)
            .credentials(Credentials::new(self.from.clone(), self.password.clone()))
            .timeout(Some(self.timeout))
            .build())
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn channel_name(&self) -> &'static str {
        "email"
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[EMAIL_FROM, EMAIL_TO, EMAIL_PASSWORD, SMTP_SERVER]
    }

    fn describe(&self, alert: &Alert) -> String {
        format!(
            "email {:?} from {} to {} via {}:{} body={:?}",
            SUBJECT, self.from, self.to, self.server, self.port, alert.message
        )
    }

    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let msg = self.build_message(alert)?;
        self.transport()?
            .send(msg)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        tracing::debug!(to = %self.to, "email accepted by relay");
        Ok(())
    }
}
