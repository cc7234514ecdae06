//! Outgoing invoice mail.

use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::{header, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use crate::config::SmtpSettings;
use crate::error::{Error, Result};

/// A plain-text file carried alongside the message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAttachment {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<TextAttachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

fn email_error(err: impl std::fmt::Display) -> Error {
    Error::Email(err.to_string())
}

/// Sends through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let transport = SmtpTransport::relay(&settings.server)
            .map_err(email_error)?
            .credentials(creds)
            .build();
        let from = settings.from.parse::<Mailbox>().map_err(email_error)?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: OutgoingEmail) -> Result<Message> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse::<Mailbox>().map_err(email_error)?)
            .subject(email.subject);

        let message = match email.attachment {
            Some(attachment) => {
                let content_type = header::ContentType::parse("text/plain; charset=utf-8")
                    .map_err(email_error)?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(email.body))
                        .singlepart(
                            Attachment::new(attachment.filename)
                                .body(attachment.content.into_bytes(), content_type),
                        ),
                )
            }
            None => builder.body(email.body),
        };

        message.map_err(email_error)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        let to = email.to.clone();
        let message = self.build_message(email)?;
        let transport = self.transport.clone();

        // lettre's SMTP transport blocks
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(email_error)?
            .map_err(email_error)?;

        info!(to = %to, "email sent");
        Ok(())
    }
}

/// Keeps sent mail in memory. Used when no SMTP relay is configured.
#[derive(Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        debug!(to = %email.to, subject = %email.subject, "email captured");
        self.outbox
            .lock()
            .map_err(|_| Error::Email("outbox lock poisoned".into()))?
            .push(email);
        Ok(())
    }
}

/// Substitutes `{{name}}` placeholders. Unknown placeholders are left as is.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{{{name}}}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders_only() {
        let text = render_template(
            "Invoice {{invoiceNumber}} for {{customerName}} {{unknown}}",
            &[("invoiceNumber", "INV-000007"), ("customerName", "Acme")],
        );
        assert_eq!(text, "Invoice INV-000007 for Acme {{unknown}}");
    }

    #[test]
    fn builds_multipart_message_with_attachment() {
        let mailer = SmtpMailer::new(&SmtpSettings {
            server: "smtp.example.com".into(),
            username: "fleet".into(),
            password: "secret".into(),
            from: "Accounts <accounts@example.com>".into(),
        })
        .unwrap();

        let message = mailer
            .build_message(OutgoingEmail {
                to: "customer@example.com".into(),
                subject: "Invoice".into(),
                body: "Please pay".into(),
                attachment: Some(TextAttachment {
                    filename: "INV-000001.txt".into(),
                    content: "statement".into(),
                }),
            })
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("INV-000001.txt"));
        assert!(raw.contains("customer@example.com"));
    }

    #[test]
    fn rejects_bad_recipient() {
        let mailer = SmtpMailer::new(&SmtpSettings {
            server: "smtp.example.com".into(),
            username: "fleet".into(),
            password: "secret".into(),
            from: "accounts@example.com".into(),
        })
        .unwrap();

        let result = mailer.build_message(OutgoingEmail {
            to: "not an address".into(),
            subject: "Invoice".into(),
            body: String::new(),
            attachment: None,
        });
        assert!(matches!(result, Err(Error::Email(_))));
    }

    #[tokio::test]
    async fn memory_mailer_keeps_sent_mail() {
        let mailer = MemoryMailer::new();
        mailer
            .send(OutgoingEmail {
                to: "a@example.com".into(),
                subject: "hi".into(),
                body: "body".into(),
                attachment: None,
            })
            .await
            .unwrap();
        assert_eq!(mailer.sent().len(), 1);
    }
}
