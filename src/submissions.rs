//! Public form submissions: contact messages and appointment requests.
//!
//! Each submission is validated, stored, and then announced by mail. Mail is
//! best effort: once the row is written a delivery failure only changes the
//! message shown to the visitor.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::error::PortfolioError;
use crate::mail::{self, MailError};
use crate::router::{AppState, Request, Response};
use crate::store::{self, NewAppointment, NewContactMessage};

pub const CONTACT_SENT: &str =
    "Thank you! Your message has been sent successfully. I'll get back to you soon.";
pub const CONTACT_SAVED: &str = "Your message has been saved. I'll get back to you soon.";
pub const APPOINTMENT_SENT: &str = "Thank you! Your appointment request has been submitted successfully. I'll get back to you within 24 hours to confirm the details.";
pub const APPOINTMENT_SAVED: &str =
    "Your appointment request has been saved. I'll get back to you soon to confirm the details.";

/// JSON body returned by the submission endpoints.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Invalid data format.")]
    InvalidFormat,

    #[error("{0}")]
    Validation(&'static str),

    #[error("Invalid header found. Please check your input.")]
    BadHeader,

    #[error("An error occurred. Please try again.")]
    Internal(#[from] PortfolioError),
}

impl SubmissionError {
    pub fn status_code(&self) -> u16 {
        match self {
            SubmissionError::Internal(_) => 500,
            _ => 400,
        }
    }
}

/// A stored submission and the message to show the visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub id: i64,
    pub message: &'static str,
}

fn respond(result: Result<Submitted, SubmissionError>) -> Response {
    let (status, envelope) = match result {
        Ok(done) => (
            200,
            Envelope {
                success: true,
                message: done.message.to_string(),
            },
        ),
        Err(e) => {
            if let SubmissionError::Internal(inner) = &e {
                log::error!("Submission failed: {}", inner);
            }
            (
                e.status_code(),
                Envelope {
                    success: false,
                    message: e.to_string(),
                },
            )
        }
    };
    Response::json(envelope, status, HashMap::new())
}

fn parse_body(body: &[u8]) -> Result<Map<String, Value>, SubmissionError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(SubmissionError::InvalidFormat),
    }
}

/// A present, non-blank text field. Numbers are accepted as their text form.
fn text_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Appointment type ids arrive as numbers or, from `<select>` values, as strings.
fn id_field(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Normalise an ISO-8601 date or date-time. Values with an offset are
/// converted to UTC. Returns `None` when unparsable.
pub fn parse_preferred_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let with_offset = match raw.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => raw.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&with_offset) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, format) {
            return Some(dt.with_timezone(&Utc).to_rfc3339());
        }
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%dT00:00:00").to_string())
}

/// Validate, store and announce a contact message.
pub async fn submit_contact(state: &AppState, body: &[u8]) -> Result<Submitted, SubmissionError> {
    let data = parse_body(body)?;
    let (Some(sender_email), Some(subject), Some(message)) = (
        text_field(&data, "sender"),
        text_field(&data, "subject"),
        text_field(&data, "message"),
    ) else {
        return Err(SubmissionError::Validation("Please fill in all fields."));
    };

    let new = NewContactMessage {
        sender_email,
        subject,
        message,
    };
    let id = store::insert_contact_message(&state.db, &new).await?;
    log::info!("Stored contact message {} from {}", id, new.sender_email);

    let email_settings = &state.settings.email;
    let notification = mail::contact_notification(email_settings, &new);
    match state.mailer.send(&notification).await {
        Ok(()) => {
            let confirmation = mail::contact_confirmation(email_settings, &new);
            if let Err(e) = state.mailer.send(&confirmation).await {
                log::warn!("Contact confirmation to {} failed: {}", new.sender_email, e);
            }
            Ok(Submitted {
                id,
                message: CONTACT_SENT,
            })
        }
        Err(MailError::BadHeader(field)) => {
            log::warn!("Contact message {} has an invalid {} header", id, field);
            Err(SubmissionError::BadHeader)
        }
        Err(e) => {
            log::warn!("Contact notification for message {} failed: {}", id, e);
            Ok(Submitted {
                id,
                message: CONTACT_SAVED,
            })
        }
    }
}

/// Validate, store and announce an appointment request.
pub async fn submit_appointment(
    state: &AppState,
    body: &[u8],
) -> Result<Submitted, SubmissionError> {
    let data = parse_body(body)?;
    let type_value = data
        .get("appointment_type")
        .filter(|v| match v {
            Value::String(s) => !s.trim().is_empty(),
            // Zero is not a valid id and counts as missing.
            Value::Number(n) => n.as_f64() != Some(0.0),
            _ => false,
        })
        .cloned();
    let (Some(type_value), Some(client_name), Some(client_email), Some(purpose)) = (
        type_value,
        text_field(&data, "client_name"),
        text_field(&data, "client_email"),
        text_field(&data, "purpose"),
    ) else {
        return Err(SubmissionError::Validation(
            "Please fill in all required fields.",
        ));
    };

    let invalid_type = SubmissionError::Validation("Invalid appointment type selected.");
    let Some(type_id) = id_field(&type_value) else {
        return Err(invalid_type);
    };
    let Some(kind) = store::active_appointment_type(&state.db, type_id).await? else {
        return Err(invalid_type);
    };

    let new = NewAppointment {
        appointment_type_id: kind.id,
        client_name,
        client_email,
        client_phone: text_field(&data, "client_phone").unwrap_or_default(),
        company: text_field(&data, "company").unwrap_or_default(),
        purpose,
        preferred_date: text_field(&data, "preferred_date")
            .as_deref()
            .and_then(parse_preferred_date),
    };
    let id = store::insert_appointment(&state.db, &new).await?;
    log::info!("Stored appointment {} for {}", id, new.client_email);

    let email_settings = &state.settings.email;
    let notification = mail::appointment_notification(email_settings, &kind, &new, id);
    if let Err(e) = state.mailer.send(&notification).await {
        log::warn!("Appointment notification for {} failed: {}", id, e);
        return Ok(Submitted {
            id,
            message: APPOINTMENT_SAVED,
        });
    }
    let confirmation = mail::appointment_confirmation(email_settings, &kind, &new);
    if let Err(e) = state.mailer.send(&confirmation).await {
        log::warn!("Appointment confirmation to {} failed: {}", new.client_email, e);
    }
    Ok(Submitted {
        id,
        message: APPOINTMENT_SENT,
    })
}

pub async fn contact_submit(request: Request, state: AppState) -> Response {
    respond(submit_contact(&state, &request.body).await)
}

pub async fn appointment_submit(request: Request, state: AppState) -> Response {
    respond(submit_appointment(&state, &request.body).await)
}
