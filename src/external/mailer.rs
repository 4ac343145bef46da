use crate::config::SmtpConfig;
use crate::errors::AppError;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
}

/// Outbound email collaborator
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), AppError>;
}

/// Resolves an owner's registered email address. Account management
/// itself lives outside this crate.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn email_for(&self, owner: &str) -> Option<String>;
}

/// SMTP mailer backed by lettre. With SMTP disabled it logs the message
/// instead of sending, so a dev environment never needs credentials.
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), AppError> {
        if !self.config.enabled {
            info!(
                "📧 SMTP disabled; email to {} would be sent: {}",
                email.to, email.subject
            );
            return Ok(());
        }

        let from_address = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid from address: {}", e)))?;
        let to_address = email
            .to
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid to address: {}", e)))?;

        let builder = Message::builder()
            .from(from_address)
            .to(to_address)
            .subject(email.subject.clone());

        let message = match email.html_body {
            Some(html) => builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(email.text_body),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html),
                        ),
                )
                .map_err(|e| AppError::Validation(format!("Failed to build email: {}", e)))?,
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(email.text_body)
                .map_err(|e| AppError::Validation(format!("Failed to build email: {}", e)))?,
        };

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| AppError::External(format!("Failed to create SMTP transport: {}", e)))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| AppError::External(format!("SMTP send failed: {}", e)))?;

        info!("✅ Email sent to {}", email.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: "trader@example.com".to_string(),
            subject: "Alert: bearish swing - TEST.NS".to_string(),
            text_body: "Sentiment -0.30 crossed lt -0.1".to_string(),
            html_body: None,
        }
    }

    #[tokio::test]
    async fn test_disabled_smtp_logs_instead_of_sending() {
        let mailer = SmtpMailer::new(SmtpConfig {
            enabled: false,
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@stockpulse.local".to_string(),
            from_name: "StockPulse".to_string(),
        });
        assert!(mailer.send(email()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_from_address_is_validation_error() {
        let mailer = SmtpMailer::new(SmtpConfig {
            enabled: true,
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "user".to_string(),
            password: "pass".to_string(),
            from_email: "not an address".to_string(),
            from_name: "StockPulse".to_string(),
        });
        let result = mailer.send(email()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

