/// Email delivery for one-time codes
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::otp::OtpPurpose;
use crate::validators::mask_email;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to configure SMTP transport: {0}")]
    Config(String),

    #[error("failed to build email message: {0}")]
    Build(String),

    #[error("failed to send email: {0}")]
    Transport(String),
}

/// One send attempt per call; callers do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_otp(
        &self,
        destination: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), EmailError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub starttls: bool,
}

/// Async SMTP transport
#[derive(Clone)]
pub struct SmtpEmailSender {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    code_ttl: Duration,
}

impl SmtpEmailSender {
    pub fn new(settings: &SmtpSettings, code_ttl: Duration) -> Result<Self, EmailError> {
        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| EmailError::InvalidAddress(format!("SMTP_FROM: {e}")))?;

        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
        }
        .map_err(|e| EmailError::Config(e.to_string()))?
        .port(settings.port);

        let builder = if let (Some(username), Some(password)) =
            (&settings.username, &settings.password)
        {
            builder.credentials(Credentials::new(username.to_string(), password.to_string()))
        } else {
            builder
        };

        Ok(Self {
            transport: Arc::new(builder.build()),
            from,
            code_ttl,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_otp(
        &self,
        destination: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), EmailError> {
        let to = destination
            .parse::<Mailbox>()
            .map_err(|e| EmailError::InvalidAddress(e.to_string()))?;

        let content = OtpEmail::new(code, purpose, self.code_ttl);
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(content.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(content.html),
                    ),
            )
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        info!(%purpose, destination = %mask_email(destination), "OTP email sent");
        Ok(())
    }
}

/// Used when SMTP is not configured: logs and reports success.
#[derive(Debug, Clone, Default)]
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send_otp(
        &self,
        destination: &str,
        _code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), EmailError> {
        info!(
            %purpose,
            destination = %mask_email(destination),
            "Email sender running in no-op mode; skipping actual send"
        );
        Ok(())
    }
}

struct OtpEmail {
    subject: &'static str,
    text: String,
    html: String,
}

impl OtpEmail {
    fn new(code: &str, purpose: OtpPurpose, ttl: Duration) -> Self {
        let (subject, action) = match purpose {
            OtpPurpose::Signup => ("Verify your email address", "finish creating your account"),
            OtpPurpose::PasswordChange => ("Confirm your password change", "change your password"),
            OtpPurpose::PasswordReset => ("Reset your password", "reset your password"),
        };
        let minutes = (ttl.as_secs() / 60).max(1);

        let text = format!(
            "Your verification code is {code}\n\n\
             Enter it to {action}. The code expires in {minutes} minute(s) and can be used once.\n\
             If you did not request this, you can ignore this email."
        );
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px; color: #333;">
    <h2>{subject}</h2>
    <p>Enter this code to {action}:</p>
    <p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
    <p style="color: #999; font-size: 12px;">
        The code expires in {minutes} minute(s) and can be used once.<br>
        If you did not request this, you can ignore this email.
    </p>
</body>
</html>"#
        );

        Self {
            subject,
            text,
            html,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_content_mentions_code_and_expiry() {
        let email = OtpEmail::new("AB12CD", OtpPurpose::PasswordReset, Duration::from_secs(300));
        assert_eq!(email.subject, "Reset your password");
        assert!(email.text.contains("AB12CD"));
        assert!(email.text.contains("5 minute(s)"));
        assert!(email.html.contains("AB12CD"));
    }

    #[test]
    fn test_invalid_from_address() {
        let settings = SmtpSettings {
            host: "smtp.example.com".into(),
            port: 587,
            username: None,
            password: None,
            from: "not an address".into(),
            starttls: true,
        };
        assert!(matches!(
            SmtpEmailSender::new(&settings, Duration::from_secs(300)),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_noop_sender_succeeds() {
        NoopEmailSender
            .send_otp("a@b.com", "ABC123", OtpPurpose::Signup)
            .await
            .unwrap();
    }
}
