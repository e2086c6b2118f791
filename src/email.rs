//! Booking notifications: best-effort email on create/update/cancel.
//! Failures are logged and never fail the booking operation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{EmailBackend, EmailConfig};
use crate::errors::ApiError;
use crate::models::BookingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingEvent {
    Created,
    Updated,
    Cancelled,
}

impl BookingEvent {
    fn subject(&self) -> &'static str {
        match self {
            BookingEvent::Created => "Booking Created",
            BookingEvent::Updated => "Booking Updated",
            BookingEvent::Cancelled => "Booking Cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingNotification {
    pub recipient_email: String,
    pub recipient_name: String,
    pub resource_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub notes: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        event: BookingEvent,
        notification: &BookingNotification,
    ) -> Result<(), ApiError>;
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    /// Logs rendered messages instead of sending them.
    Console,
}

pub struct EmailNotifier {
    transport: EmailTransport,
    from_address: String,
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig) -> Result<Self, ApiError> {
        let transport = match &config.backend {
            EmailBackend::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let smtp = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| ApiError::internal(format!("failed to create SMTP transport: {}", e)))?
                    .port(*port)
                    .credentials(Credentials::new(username.clone(), password.clone()))
                    .build();
                EmailTransport::Smtp(smtp)
            }
            EmailBackend::Console => EmailTransport::Console,
        };

        Ok(EmailNotifier {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    fn body(event: BookingEvent, n: &BookingNotification) -> String {
        let status_text = match event {
            BookingEvent::Cancelled => "been cancelled".to_string(),
            _ => format!("been {}", n.status),
        };
        let notes = if n.notes.is_empty() {
            "No notes given"
        } else {
            &n.notes
        };
        format!(
            "Dear {},\n\n\
             Your booking for {} from {} to {} has {}.\n\
             Notes: {}\n\n\
             Thank you.",
            n.recipient_name,
            n.resource_name,
            n.start_time.format("%Y-%m-%d %H:%M"),
            n.end_time.format("%H:%M"),
            status_text,
            notes,
        )
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        event: BookingEvent,
        notification: &BookingNotification,
    ) -> Result<(), ApiError> {
        let subject = event.subject();
        let body = Self::body(event, notification);

        match &self.transport {
            EmailTransport::Console => {
                log::info!(
                    "[email] to={} subject={}\n{}",
                    notification.recipient_email,
                    subject,
                    body
                );
                Ok(())
            }
            EmailTransport::Smtp(smtp) => {
                let from = self
                    .from_address
                    .parse::<Mailbox>()
                    .map_err(|e| ApiError::internal(format!("invalid from address: {}", e)))?;
                let to = format!(
                    "{} <{}>",
                    notification.recipient_name, notification.recipient_email
                )
                .parse::<Mailbox>()
                .map_err(|e| ApiError::internal(format!("invalid recipient address: {}", e)))?;

                let message = Message::builder()
                    .from(from)
                    .to(to)
                    .subject(subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(body)
                    .map_err(|e| ApiError::internal(format!("failed to build message: {}", e)))?;

                smtp.send(message)
                    .await
                    .map_err(|e| ApiError::internal(format!("failed to send email: {}", e)))?;
                Ok(())
            }
        }
    }
}

/// Fire-and-forget dispatch. The booking transaction has already
/// committed; a delivery failure is logged, never surfaced.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: BookingEvent, notification: BookingNotification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(event, &notification).await {
            log::error!(
                "failed to send booking notification to {}: {:?}",
                notification.recipient_email,
                e
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification(status: BookingStatus, notes: &str) -> BookingNotification {
        BookingNotification {
            recipient_email: "alice@example.com".to_string(),
            recipient_name: "alice".to_string(),
            resource_name: "Conference Room A".to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 9, 1, 14, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 9, 1, 16, 0, 0).unwrap(),
            status,
            notes: notes.to_string(),
        }
    }

    #[test]
    fn body_names_resource_window_and_status() {
        let body = EmailNotifier::body(
            BookingEvent::Created,
            &notification(BookingStatus::Pending, "team standup"),
        );
        assert!(body.contains("Dear alice,"));
        assert!(body.contains("Conference Room A"));
        assert!(body.contains("from 2026-09-01 14:00 to 16:00"));
        assert!(body.contains("has been pending"));
        assert!(body.contains("Notes: team standup"));
    }

    #[test]
    fn cancelled_event_overrides_status_wording() {
        let body = EmailNotifier::body(
            BookingEvent::Cancelled,
            &notification(BookingStatus::Confirmed, ""),
        );
        assert!(body.contains("has been cancelled"));
        assert!(body.contains("Notes: No notes given"));
    }

    #[tokio::test]
    async fn console_backend_never_fails() {
        let notifier = EmailNotifier::new(&EmailConfig {
            backend: EmailBackend::Console,
            from_address: "bookings@example.com".to_string(),
        })
        .unwrap();
        let result = notifier
            .notify(
                BookingEvent::Updated,
                &notification(BookingStatus::Confirmed, ""),
            )
            .await;
        assert!(result.is_ok());
    }
}
