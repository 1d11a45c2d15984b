//! Outbound email: the [`Mailer`] trait, its implementations and the
//! templated messages the workflow sends.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates.

use std::sync::Arc;

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::{ExposeSecret, SecretString};
use store::{OrderDetail, User};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The mailer refused the message.
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A rendered message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Delivers rendered emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailerError>;
}

// -- Templates --

#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeEmailHtml<'a> {
    name: &'a str,
    email: &'a str,
    role: &'a str,
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeEmailText<'a> {
    name: &'a str,
    email: &'a str,
    role: &'a str,
}

/// One line of the order confirmation.
#[derive(Debug, Clone)]
pub struct ConfirmationLine {
    pub model_name: String,
    pub size: i32,
    pub quantity: i32,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    name: &'a str,
    order_id: String,
    total: String,
    lines: &'a [ConfirmationLine],
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    name: &'a str,
    order_id: String,
    total: String,
    lines: &'a [ConfirmationLine],
}

/// Renders the welcome email for a newly registered user.
pub fn welcome_email(user: &User) -> Result<Email, MailerError> {
    let role = user.role.as_str();
    Ok(Email {
        to: user.email.clone(),
        subject: "Welcome aboard".to_string(),
        text: WelcomeEmailText {
            name: &user.name,
            email: &user.email,
            role,
        }
        .render()?,
        html: WelcomeEmailHtml {
            name: &user.name,
            email: &user.email,
            role,
        }
        .render()?,
    })
}

/// Renders the confirmation sent to the owner of a placed order.
///
/// Returns `None` for guest orders.
pub fn order_confirmation_email(
    detail: &OrderDetail,
    lines: &[ConfirmationLine],
) -> Result<Option<Email>, MailerError> {
    let Some(user) = &detail.user else {
        return Ok(None);
    };
    let order_id = detail.order.id.to_string();
    let total = detail.order.total.to_string();
    Ok(Some(Email {
        to: user.email.clone(),
        subject: format!("Order {order_id} registered"),
        text: OrderConfirmationText {
            name: &user.name,
            order_id: order_id.clone(),
            total: total.clone(),
            lines,
        }
        .render()?,
        html: OrderConfirmationHtml {
            name: &user.name,
            order_id,
            total,
            lines,
        }
        .render()?,
    }))
}

// -- SMTP --

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

/// Sends email through an SMTP relay with STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from settings.
    ///
    /// # Errors
    ///
    /// Returns error if the relay address is invalid.
    pub fn new(settings: &SmtpSettings) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            settings.username.clone(),
            settings.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: settings.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailerError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| MailerError::InvalidAddress(email.to.clone()))?)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html),
                    ),
            )?;

        self.transport.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

// -- Logging and in-memory --

/// Logs messages instead of sending them. Used when SMTP is not configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email not sent (SMTP not configured)");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<Email>,
    fail: bool,
}

/// In-memory mailer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<Mutex<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Returns the messages sent so far.
    pub async fn sent(&self) -> Vec<Email> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, email: Email) -> Result<(), MailerError> {
        let mut state = self.state.lock().await;
        if state.fail {
            return Err(MailerError::Rejected(format!("refusing mail to {}", email.to)));
        }
        state.sent.push(email);
        Ok(())
    }
}
