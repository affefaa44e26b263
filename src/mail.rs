//! Outgoing mail: the `Mailer` gateway, its backends, and the notification
//! messages sent by the submission handlers.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::models::AppointmentType;
use crate::settings::{EmailBackend, EmailSettings};
use crate::store::{NewAppointment, NewContactMessage};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// A header value contains a line break.
    #[error("Invalid header found in {0}")]
    BadHeader(&'static str),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Reject header injection before any backend sees the message.
    pub fn check_headers(&self) -> Result<(), MailError> {
        let has_break = |s: &str| s.contains('\r') || s.contains('\n');
        if has_break(&self.subject) {
            return Err(MailError::BadHeader("subject"));
        }
        if has_break(&self.from) {
            return Err(MailError::BadHeader("from"));
        }
        if self.to.iter().any(|to| has_break(to)) {
            return Err(MailError::BadHeader("to"));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    async fn deliver(&self, email: &Email) -> Result<(), MailError>;

    async fn send(&self, email: &Email) -> Result<(), MailError> {
        email.check_headers()?;
        self.deliver(email).await
    }
}

/// Writes outgoing mail to the log instead of sending it.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn deliver(&self, email: &Email) -> Result<(), MailError> {
        log::info!(
            "📧 From: {}\nTo: {}\nSubject: {}\n\n{}",
            email.from,
            email.to.join(", "),
            email.subject,
            email.body
        );
        Ok(())
    }
}

/// Keeps outgoing mail in memory, e.g. for inspection in tests.
#[derive(Default, Clone)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<Email>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        MemoryMailer::default()
    }

    pub fn outbox(&self) -> Vec<Email> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn deliver(&self, email: &Email) -> Result<(), MailError> {
        self.outbox
            .lock()
            .map_err(|_| MailError::Delivery("outbox lock poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}

/// Delivers mail through an SMTP relay.
pub struct SmtpMailer {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self, MailError> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, Tokio1Executor};

        let mut builder = if settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        };
        builder = builder.port(settings.port);
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Ok(SmtpMailer {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn deliver(&self, email: &Email) -> Result<(), MailError> {
        use lettre::message::header::ContentType;
        use lettre::{AsyncTransport, Message};

        let parse = |addr: &str| -> Result<lettre::message::Mailbox, MailError> {
            addr.parse()
                .map_err(|e: lettre::address::AddressError| MailError::Address(e.to_string()))
        };
        let mut builder = Message::builder()
            .from(parse(&email.from)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &email.to {
            builder = builder.to(parse(to)?);
        }
        let message = builder
            .body(email.body.clone())
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Build the mail gateway selected by the settings.
pub fn build_mailer(settings: &EmailSettings) -> Result<Arc<dyn Mailer>, MailError> {
    let mailer: Arc<dyn Mailer> = match settings.backend {
        EmailBackend::Console => Arc::new(ConsoleMailer),
        EmailBackend::Memory => Arc::new(MemoryMailer::new()),
        EmailBackend::Smtp => Arc::new(SmtpMailer::new(settings)?),
    };
    log::info!("Using {} mail backend", mailer.name());
    Ok(mailer)
}

pub fn contact_notification(settings: &EmailSettings, msg: &NewContactMessage) -> Email {
    Email {
        from: settings.default_from.clone(),
        to: vec![settings.contact_email.clone()],
        subject: format!("Portfolio Contact: {}", msg.subject),
        body: format!(
            "New contact form submission.\n\nFrom: {}\nSubject: {}\n\nMessage:\n{}\n",
            msg.sender_email, msg.subject, msg.message
        ),
    }
}

pub fn contact_confirmation(settings: &EmailSettings, msg: &NewContactMessage) -> Email {
    Email {
        from: settings.default_from.clone(),
        to: vec![msg.sender_email.clone()],
        subject: format!("Thank you for contacting {}", settings.owner_name),
        body: format!(
            "Hi there,\n\nI've received your message about \"{}\" and will get back to you as soon as possible.\n\nBest regards,\n{}\n",
            msg.subject, settings.owner_name
        ),
    }
}

fn preferred_date_text(appointment: &NewAppointment, fallback: &str) -> String {
    appointment
        .preferred_date
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

pub fn appointment_notification(
    settings: &EmailSettings,
    kind: &AppointmentType,
    appointment: &NewAppointment,
    appointment_id: i64,
) -> Email {
    Email {
        from: settings.default_from.clone(),
        to: vec![settings.contact_email.clone()],
        subject: format!("New Appointment Request: {}", kind.name),
        body: format!(
            "New appointment request.\n\nClient: {}\nEmail: {}\nPhone: {}\nCompany: {}\n\
             Appointment Type: {} ({} minutes)\nPurpose: {}\nPreferred Date: {}\n\n\
             Appointment ID: {}\n",
            appointment.client_name,
            appointment.client_email,
            appointment.client_phone,
            appointment.company,
            kind.name,
            kind.duration,
            appointment.purpose,
            preferred_date_text(appointment, "Not specified"),
            appointment_id
        ),
    }
}

pub fn appointment_confirmation(
    settings: &EmailSettings,
    kind: &AppointmentType,
    appointment: &NewAppointment,
) -> Email {
    Email {
        from: settings.default_from.clone(),
        to: vec![appointment.client_email.clone()],
        subject: format!("Appointment Request Received - {}", kind.name),
        body: format!(
            "Hi {},\n\nThank you for requesting a {} session ({} minutes).\n\
             Purpose: {}\nPreferred Date: {}\n\n\
             I'll review your request and confirm the details within 24 hours.\n\nBest regards,\n{}\n",
            appointment.client_name,
            kind.name,
            kind.duration,
            appointment.purpose,
            preferred_date_text(appointment, "To be scheduled"),
            settings.owner_name
        ),
    }
}

/// Message used by the `send-test-email` command.
pub fn test_email(settings: &EmailSettings, to: &str) -> Email {
    Email {
        from: settings.default_from.clone(),
        to: vec![to.to_string()],
        subject: "Portfolio Website - Email Test".to_string(),
        body: format!(
            "If you receive this email, your email configuration is working.\n\nBackend: {:?}\nHost: {}\nFrom: {}\n",
            settings.backend, settings.host, settings.default_from
        ),
    }
}
