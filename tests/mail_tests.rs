use portfolio::mail::{self, Email, MailError, Mailer, MemoryMailer, build_mailer};
use portfolio::settings::{EmailBackend, EmailSettings};
use portfolio::store::{NewAppointment, NewContactMessage};

fn email(subject: &str) -> Email {
    Email {
        from: "site@example.com".into(),
        to: vec!["owner@example.com".into()],
        subject: subject.into(),
        body: "body".into(),
    }
}

#[tokio::test]
async fn test_memory_mailer_records_messages() {
    let mailer = MemoryMailer::new();
    mailer.send(&email("Hello")).await.unwrap();
    let outbox = mailer.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].subject, "Hello");
}

#[tokio::test]
async fn test_header_injection_is_rejected_before_delivery() {
    let mailer = MemoryMailer::new();
    let err = mailer.send(&email("Hi\nBcc: x@y.com")).await.unwrap_err();
    assert_eq!(err, MailError::BadHeader("subject"));

    let mut bad_to = email("Hi");
    bad_to.to = vec!["a@b.com\r\nCc: c@d.com".into()];
    assert_eq!(bad_to.check_headers(), Err(MailError::BadHeader("to")));
    assert!(mailer.outbox().is_empty());
}

#[tokio::test]
async fn test_console_backend_delivers() {
    let settings = EmailSettings::default();
    let mailer = build_mailer(&settings).unwrap();
    assert_eq!(mailer.name(), "console");
    mailer.send(&email("Hello")).await.unwrap();
}

#[test]
fn test_build_mailer_selects_backend() {
    let settings = EmailSettings {
        backend: EmailBackend::Memory,
        ..EmailSettings::default()
    };
    assert_eq!(build_mailer(&settings).unwrap().name(), "memory");
}

#[test]
fn test_notification_messages() {
    let settings = EmailSettings {
        contact_email: "owner@example.com".into(),
        owner_name: "Ada".into(),
        ..EmailSettings::default()
    };
    let msg = NewContactMessage {
        sender_email: "visitor@example.com".into(),
        subject: "Hello".into(),
        message: "Nice site".into(),
    };
    let notification = mail::contact_notification(&settings, &msg);
    assert_eq!(notification.to, vec!["owner@example.com".to_string()]);
    assert!(notification.body.contains("Nice site"));
    let confirmation = mail::contact_confirmation(&settings, &msg);
    assert_eq!(confirmation.to, vec!["visitor@example.com".to_string()]);
    assert_eq!(confirmation.subject, "Thank you for contacting Ada");

    let appointment = NewAppointment {
        appointment_type_id: 1,
        client_name: "Grace".into(),
        client_email: "grace@example.com".into(),
        client_phone: String::new(),
        company: "Navy".into(),
        purpose: "Compilers".into(),
        preferred_date: None,
    };
    let test = mail::test_email(&settings, "me@example.com");
    assert_eq!(test.to, vec!["me@example.com".to_string()]);

    let kind = portfolio::models::AppointmentType {
        id: 1,
        name: "Mentoring".into(),
        description: String::new(),
        duration: 30,
        calendly_event_type: String::new(),
        price_cents: 0,
        is_active: true,
        sort_order: 0,
        created_at: String::new(),
        updated_at: String::new(),
    };
    let notification = mail::appointment_notification(&settings, &kind, &appointment, 7);
    assert!(notification.body.contains("Preferred Date: Not specified"));
    assert!(notification.body.contains("Appointment ID: 7"));
    let confirmation = mail::appointment_confirmation(&settings, &kind, &appointment);
    assert!(confirmation.body.contains("Preferred Date: To be scheduled"));
    assert_eq!(confirmation.to, vec!["grace@example.com".to_string()]);
}
