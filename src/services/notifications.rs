//! Outbound notification boundary.
//!
//! Circulation transactions commit first; notification dispatch is a
//! post-commit, best-effort step. A failed notification is logged and never
//! rolls back or fails the operation that triggered it.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
    models::{
        borrower::Borrower,
        document::Document,
        loan::Loan,
        reservation::{QueueEntry, Reservation},
    },
};

/// Outbound calls the circulation engine makes. Implementations must be
/// safe to drop on the floor: callers never await delivery inside a
/// transaction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn reservation_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        reservation: &Reservation,
    ) -> AppResult<()>;

    async fn loan_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()>;

    /// A copy freed up; tell a waiting borrower. Fulfillment stays an
    /// explicit action, this is informational only.
    async fn document_available(&self, entry: &QueueEntry, document: &Document) -> AppResult<()>;

    async fn extension_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()>;

    async fn return_confirmed(&self, borrower: &Borrower, document: &Document) -> AppResult<()>;
}

/// Await a notification future and swallow its error. Services wrap this in
/// `tokio::spawn` after their transaction commits.
pub async fn run_notify(label: &'static str, fut: impl Future<Output = AppResult<()>>) {
    if let Err(err) = fut.await {
        tracing::warn!("notification '{}' failed: {}", label, err);
    }
}

/// SMTP-backed notifier
#[derive(Clone)]
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Generic email sending function
    async fn send_email(&self, to: Option<&str>, subject: &str, body: &str) -> AppResult<()> {
        let Some(to) = to else {
            tracing::debug!("skipping notification '{}': borrower has no email", subject);
            return Ok(());
        };

        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Orbis");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        mailer
            .send(&email)
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn reservation_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        reservation: &Reservation,
    ) -> AppResult<()> {
        let subject = format!("Reservation confirmed: {}", document.title);
        let body = format!(
            r#"
Hello {name},

Your reservation for "{title}" is confirmed.

You are number {position} in the queue. The reservation is held until
{expiry}; after that it lapses and the next borrower is served.
"#,
            name = borrower.name,
            title = document.title,
            position = reservation.priority_order,
            expiry = reservation.expiry_date.format("%Y-%m-%d"),
        );
        self.send_email(borrower.email.as_deref(), &subject, &body).await
    }

    async fn loan_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()> {
        let subject = format!("Loan confirmed: {}", document.title);
        let body = format!(
            r#"
Hello {name},

"{title}" has been checked out to you.

Please return it by {due}.
"#,
            name = borrower.name,
            title = document.title,
            due = loan.due_date.format("%Y-%m-%d"),
        );
        self.send_email(borrower.email.as_deref(), &subject, &body).await
    }

    async fn document_available(&self, entry: &QueueEntry, document: &Document) -> AppResult<()> {
        let subject = format!("Now available: {}", document.title);
        let body = format!(
            r#"
Hello {name},

A copy of "{title}" has been returned and is available.

You are number {position} in the queue. Visit the library or your account
page to check it out; your reservation is held until {expiry}.
"#,
            name = entry.borrower_name,
            title = document.title,
            position = entry.priority_order,
            expiry = entry.expiry_date.format("%Y-%m-%d"),
        );
        self.send_email(entry.borrower_email.as_deref(), &subject, &body).await
    }

    async fn extension_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()> {
        let subject = format!("Loan extended: {}", document.title);
        let body = format!(
            r#"
Hello {name},

Your loan of "{title}" has been extended.

The new due date is {due}.
"#,
            name = borrower.name,
            title = document.title,
            due = loan.due_date.format("%Y-%m-%d"),
        );
        self.send_email(borrower.email.as_deref(), &subject, &body).await
    }

    async fn return_confirmed(&self, borrower: &Borrower, document: &Document) -> AppResult<()> {
        let subject = format!("Return confirmed: {}", document.title);
        let body = format!(
            r#"
Hello {name},

We have registered your return of "{title}". Thank you.
"#,
            name = borrower.name,
            title = document.title,
        );
        self.send_email(borrower.email.as_deref(), &subject, &body).await
    }
}

/// Log-only notifier used when email is disabled
#[derive(Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn reservation_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        reservation: &Reservation,
    ) -> AppResult<()> {
        tracing::info!(
            borrower = borrower.id,
            document = document.id,
            priority = reservation.priority_order,
            "notification: reservation confirmed"
        );
        Ok(())
    }

    async fn loan_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()> {
        tracing::info!(
            borrower = borrower.id,
            document = document.id,
            due = %loan.due_date,
            "notification: loan confirmed"
        );
        Ok(())
    }

    async fn document_available(&self, entry: &QueueEntry, document: &Document) -> AppResult<()> {
        tracing::info!(
            borrower = entry.borrower_id,
            document = document.id,
            priority = entry.priority_order,
            "notification: document available"
        );
        Ok(())
    }

    async fn extension_confirmed(
        &self,
        borrower: &Borrower,
        document: &Document,
        loan: &Loan,
    ) -> AppResult<()> {
        tracing::info!(
            borrower = borrower.id,
            document = document.id,
            due = %loan.due_date,
            "notification: loan extended"
        );
        Ok(())
    }

    async fn return_confirmed(&self, borrower: &Borrower, document: &Document) -> AppResult<()> {
        tracing::info!(
            borrower = borrower.id,
            document = document.id,
            "notification: return confirmed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::Utc;

    fn borrower_without_email() -> Borrower {
        Borrower {
            id: 1,
            name: "No Mail".to_string(),
            email: None,
            max_loans: 5,
            max_reservations: 5,
            status: crate::models::borrower::BorrowerStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn document() -> Document {
        Document {
            id: 1,
            kind: crate::models::document::DocumentKind::Book,
            title: "Test".to_string(),
            total_copies: 1,
            available_copies: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn borrowers_without_email_are_skipped() {
        // Must not attempt SMTP delivery at all
        let notifier = EmailNotifier::new(EmailConfig::default());
        let result = notifier
            .return_confirmed(&borrower_without_email(), &document())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn run_notify_swallows_failures() {
        let mut mock = MockNotifier::new();
        mock.expect_return_confirmed()
            .returning(|_, _| Err(AppError::Admission(ErrorCode::Failure, "smtp down".to_string())));
        // Completes normally; the error only ends up in the log
        run_notify(
            "return_confirmed",
            mock.return_confirmed(&borrower_without_email(), &document()),
        )
        .await;
    }
}
