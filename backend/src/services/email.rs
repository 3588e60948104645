use crate::automations::{MailError, MailSender};
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    pub async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| MailError::Recipient(e.to_string()))?;
        let to = to_email
            .parse::<Mailbox>()
            .map_err(|e| MailError::Recipient(format!("{}: {}", to_email, e)))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Send(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(MailError::Send(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl MailSender for EmailService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.send_email(to, subject, body).await
    }
}
