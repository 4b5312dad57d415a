use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::EmailConfig;
use crate::core::Digest;
use crate::plugins::traits::{NotificationResult, Notifier};
use crate::utils::error::{AppError, Result};
use crate::utils::retry::RetryPolicy;

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    retry: RetryPolicy,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, retry: RetryPolicy) -> Result<Self> {
        if !config.is_configured() {
            return Err(AppError::config(
                "email notifier needs username, password and at least one recipient",
            ));
        }

        let sender = config
            .sender()
            .ok_or_else(|| AppError::config("email sender address is not set"))?;
        let from: Mailbox = sender.parse()?;
        let to = config
            .to_addresses
            .iter()
            .map(|address| address.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let credentials = Credentials::new(
            config.username.clone().unwrap_or_default(),
            config.password.clone().unwrap_or_default(),
        );

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        }
        .port(config.smtp_port)
        .credentials(credentials)
        .build();

        Ok(Self {
            transport,
            from,
            to,
            retry,
        })
    }

    pub fn build_message(&self, digest: &Digest) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(digest.subject.clone());

        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        Ok(builder
            .header(header::ContentType::TEXT_PLAIN)
            .body(digest.body())?)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, digest: &Digest) -> Result<NotificationResult> {
        let message = self.build_message(digest)?;

        let sent = self
            .retry
            .run("send email", || async {
                self.transport
                    .send(message.clone())
                    .await
                    .map_err(AppError::from)
            })
            .await;

        match sent {
            Ok(response) => {
                info!(recipients = self.to.len(), code = %response.code(), "email sent");
                Ok(NotificationResult::delivered(
                    1,
                    Some(format!("email-{}", chrono::Utc::now().timestamp())),
                ))
            }
            Err(e) => {
                warn!(error = %e, "email delivery failed");
                Ok(NotificationResult::failed(0, e))
            }
        }
    }
}
