//! Outgoing mail.
//!
//! Only payment confirmations are sent. Without SMTP credentials the
//! [`LogMailer`] stands in and writes the message to the log instead.

use std::sync::Arc;

use lettre::message::{header, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("unable to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP transport failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Content of a payment confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub recipient: String,
    pub transaction_id: String,
    pub course_title: String,
    pub price: f64,
}

impl PaymentReceipt {
    pub fn subject(&self) -> String {
        format!("Payment confirmed: {}", self.course_title)
    }

    pub fn text_body(&self) -> String {
        format!(
            "Hello,\n\n\
            Thank you for your purchase. Your enrollment in \"{}\" is confirmed.\n\n\
            Transaction id: {}\n\
            Amount paid: {:.2}\n\n\
            Happy learning!",
            self.course_title, self.transaction_id, self.price
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            "<html>\
            <body>\
            <p>Hello,</p>\
            <p>Thank you for your purchase. Your enrollment in <b>{}</b> is confirmed.</p>\
            <p>Transaction id: <code>{}</code><br>\
            Amount paid: {:.2}</p>\
            <p>Happy learning!</p>\
            </body>\
            </html>",
            self.course_title, self.transaction_id, self.price
        )
    }
}

#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send_payment_confirmation(&self, receipt: &PaymentReceipt) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, username: String, password: String, from: Mailbox) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .credentials(Credentials::new(username, password))
            .build();

        Ok(SmtpMailer { transport, from })
    }
}

#[rocket::async_trait]
impl Mailer for SmtpMailer {
    async fn send_payment_confirmation(&self, receipt: &PaymentReceipt) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(receipt.recipient.parse()?)
            .subject(receipt.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(receipt.text_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(receipt.html_body()),
                    ),
            )?;

        self.transport.send(message).await?;
        tracing::info!("Sent payment confirmation to {}", receipt.recipient);
        Ok(())
    }
}

/// Writes confirmations to the log.
pub struct LogMailer;

#[rocket::async_trait]
impl Mailer for LogMailer {
    async fn send_payment_confirmation(&self, receipt: &PaymentReceipt) -> Result<(), MailError> {
        tracing::info!(
            recipient = %receipt.recipient,
            transaction_id = %receipt.transaction_id,
            "SMTP not configured, skipping mail: {}",
            receipt.subject()
        );
        Ok(())
    }
}

pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    let (username, password) = match config.credentials() {
        Some(it) => it,
        None => {
            tracing::warn!("Mail credentials missing, payment confirmations will only be logged.");
            return Ok(Arc::new(LogMailer));
        }
    };

    let from: Mailbox = config.from.as_deref().unwrap_or(&username).parse()?;
    tracing::info!("Sending mail through {} as {}", config.smtp_host, from);

    Ok(Arc::new(SmtpMailer::new(&config.smtp_host, username, password, from)?))
}
