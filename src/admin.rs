//! Admin console: generated CRUD over every content-store table.
//!
//! Each table is described once by an [`AdminModel`]; listing, searching,
//! filtering, validation and write policies are all driven from that
//! description.

use once_cell::sync::Lazy;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::error::PortfolioError;
use crate::models::{
    APPOINTMENT_DURATIONS, APPOINTMENT_STATUSES, BOOK_CATEGORIES, CHAPTER_STATUSES, Choices,
    PAPER_CATEGORIES, SKILL_CATEGORIES, choice_label,
};
use crate::orm::{Db, SqlValue};
use crate::router::{AppState, Request, Response};
use crate::store;
use crate::submissions::parse_preferred_date;
use crate::template::{Context, TemplateValue, render_template};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    LongText,
    Url,
    Email,
    Integer { min: Option<i64>, max: Option<i64> },
    Bool,
    Date,
    DateTime,
    Choice(Choices),
    IntChoice(&'static [i64]),
    /// Integer id of a row in the named table.
    ForeignKey(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    pub readonly: bool,
}

impl Field {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Field {
            name,
            kind,
            required: false,
            nullable: false,
            readonly: false,
        }
    }

    const fn required(self) -> Self {
        Field {
            required: true,
            ..self
        }
    }

    const fn nullable(self) -> Self {
        Field {
            nullable: true,
            ..self
        }
    }

    const fn readonly(self) -> Self {
        Field {
            readonly: true,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPolicy {
    Allowed,
    /// At most one row may exist.
    Singleton,
    Forbidden,
}

#[derive(Debug)]
pub struct AdminModel {
    pub slug: &'static str,
    pub verbose_name: &'static str,
    pub table: &'static str,
    pub fields: &'static [Field],
    pub list_display: &'static [&'static str],
    /// Display-only columns computed in SQL: (name, expression).
    pub computed: &'static [(&'static str, &'static str)],
    pub search_fields: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub ordering: &'static str,
    pub add_policy: AddPolicy,
    pub can_delete: bool,
    pub has_updated_at: bool,
}

impl AdminModel {
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const TEXT: FieldKind = FieldKind::Text;
const LONG: FieldKind = FieldKind::LongText;
const URL: FieldKind = FieldKind::Url;
const FLAG: FieldKind = FieldKind::Bool;
const INT: FieldKind = FieldKind::Integer {
    min: None,
    max: None,
};
const COUNT: FieldKind = FieldKind::Integer {
    min: Some(0),
    max: None,
};

const PROFILE_FIELDS: &[Field] = &[
    Field::new("name", TEXT).required(),
    Field::new("title", TEXT),
    Field::new("bio", LONG),
    Field::new("profile_image", TEXT).nullable(),
    Field::new("email", FieldKind::Email).required(),
    Field::new("phone", TEXT),
    Field::new("github_url", URL),
    Field::new("linkedin_url", URL),
    Field::new("medium_url", URL),
    Field::new("newsletter_url", URL),
    Field::new("newsletter_title", TEXT),
    Field::new("newsletter_description", LONG),
    Field::new("resume_url", URL),
    Field::new("calendly_url", URL),
];

const SKILL_FIELDS: &[Field] = &[
    Field::new("name", TEXT).required(),
    Field::new("category", FieldKind::Choice(SKILL_CATEGORIES)),
    Field::new("icon_class", TEXT),
    Field::new("proficiency_level", FieldKind::IntChoice(&[1, 2, 3, 4])),
    Field::new("years_experience", COUNT).nullable(),
    Field::new("is_featured", FLAG),
    Field::new("sort_order", INT),
];

const APPOINTMENT_TYPE_FIELDS: &[Field] = &[
    Field::new("name", TEXT).required(),
    Field::new("description", LONG).required(),
    Field::new("duration", FieldKind::IntChoice(APPOINTMENT_DURATIONS)),
    Field::new("calendly_event_type", TEXT),
    Field::new("price_cents", COUNT),
    Field::new("is_active", FLAG),
    Field::new("sort_order", INT),
];

const APPOINTMENT_FIELDS: &[Field] = &[
    Field::new("appointment_type_id", FieldKind::ForeignKey("appointment_type")).required(),
    Field::new("client_name", TEXT).required(),
    Field::new("client_email", FieldKind::Email).required(),
    Field::new("client_phone", TEXT),
    Field::new("company", TEXT),
    Field::new("purpose", LONG).required(),
    Field::new("preferred_date", FieldKind::DateTime).nullable(),
    Field::new("scheduled_date", FieldKind::DateTime).nullable(),
    Field::new("status", FieldKind::Choice(APPOINTMENT_STATUSES)),
    Field::new("calendly_event_id", TEXT),
    Field::new("google_meet_link", URL),
    Field::new("notes", LONG),
];

const PROJECT_FIELDS: &[Field] = &[
    Field::new("title", TEXT).required(),
    Field::new("description", LONG).required(),
    Field::new("github_url", URL).required(),
    Field::new("live_url", URL).nullable(),
    Field::new("image", TEXT).nullable(),
    Field::new("technologies", TEXT).required(),
    Field::new("featured", FLAG),
    Field::new("sort_order", INT),
];

const BOOK_FIELDS: &[Field] = &[
    Field::new("title", TEXT).required(),
    Field::new("author", TEXT).required(),
    Field::new("category", FieldKind::Choice(BOOK_CATEGORIES)),
    Field::new("goodreads_url", URL).required(),
    Field::new("notes_url", URL).nullable(),
    Field::new("cover_image", TEXT).nullable(),
    Field::new(
        "rating",
        FieldKind::Integer {
            min: Some(1),
            max: Some(5),
        },
    )
    .nullable(),
    Field::new("review", LONG),
    Field::new("featured", FLAG),
    Field::new("sort_order", INT),
];

const STUDY_NOTE_FIELDS: &[Field] = &[
    Field::new("book_title", TEXT).required(),
    Field::new("book_author", TEXT).required(),
    Field::new("book_description", LONG),
    Field::new("book_cover_url", URL),
    Field::new("total_chapters", COUNT),
    Field::new("completed_chapters", COUNT),
    Field::new("featured", FLAG),
];

const STUDY_CHAPTER_FIELDS: &[Field] = &[
    Field::new("study_note_id", FieldKind::ForeignKey("study_note")).required(),
    Field::new("chapter_number", INT).required(),
    Field::new("title", TEXT).required(),
    Field::new("description", LONG),
    Field::new("status", FieldKind::Choice(CHAPTER_STATUSES)),
    Field::new("notes_url", URL),
    Field::new("code_examples_url", URL),
    Field::new("sort_order", INT),
];

const PAPER_FIELDS: &[Field] = &[
    Field::new("title", TEXT).required(),
    Field::new("authors", TEXT).required(),
    Field::new("category", FieldKind::Choice(PAPER_CATEGORIES)),
    Field::new("paper_url", URL).required(),
    Field::new("notes_url", URL).nullable(),
    Field::new("summary", LONG),
    Field::new("key_insights", LONG),
    Field::new("featured", FLAG),
    Field::new("sort_order", INT),
];

const BLOG_POST_FIELDS: &[Field] = &[
    Field::new("title", TEXT).required(),
    Field::new("description", LONG).required(),
    Field::new("medium_url", URL).required(),
    Field::new("image", TEXT).nullable(),
    Field::new("tags", TEXT).required(),
    Field::new("featured", FLAG),
    Field::new("published_date", FieldKind::Date).required(),
    Field::new("sort_order", INT),
];

const CONTACT_MESSAGE_FIELDS: &[Field] = &[
    Field::new("sender_email", FieldKind::Email).readonly(),
    Field::new("subject", TEXT).readonly(),
    Field::new("message", LONG).readonly(),
    Field::new("is_read", FLAG),
];

const SITE_SETTINGS_FIELDS: &[Field] = &[
    Field::new("site_title", TEXT),
    Field::new("meta_description", LONG),
    Field::new("google_analytics_id", TEXT),
    Field::new("footer_text", TEXT),
    Field::new("google_calendar_id", TEXT),
];

/// Every table the console manages, in index order.
pub static MODELS: &[AdminModel] = &[
    AdminModel {
        slug: "profile",
        verbose_name: "Profile",
        table: "profile",
        fields: PROFILE_FIELDS,
        list_display: &["name", "title", "email", "updated_at"],
        computed: &[],
        search_fields: &[],
        list_filter: &[],
        ordering: "id ASC",
        add_policy: AddPolicy::Singleton,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "skill",
        verbose_name: "Skills",
        table: "skill",
        fields: SKILL_FIELDS,
        list_display: &[
            "name",
            "category",
            "proficiency_level",
            "years_experience",
            "is_featured",
            "sort_order",
        ],
        computed: &[],
        search_fields: &["name"],
        list_filter: &["category", "proficiency_level", "is_featured"],
        ordering: store::SKILL_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "appointment-type",
        verbose_name: "Appointment types",
        table: "appointment_type",
        fields: APPOINTMENT_TYPE_FIELDS,
        list_display: &["name", "duration", "price_cents", "is_active", "sort_order"],
        computed: &[],
        search_fields: &["name", "description"],
        list_filter: &["is_active", "duration"],
        ordering: store::APPOINTMENT_TYPE_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "appointment",
        verbose_name: "Appointments",
        table: "appointment",
        fields: APPOINTMENT_FIELDS,
        list_display: &[
            "client_name",
            "appointment_type_id",
            "client_email",
            "status",
            "scheduled_date",
            "created_at",
        ],
        computed: &[],
        search_fields: &["client_name", "client_email", "company", "purpose"],
        list_filter: &["status", "appointment_type_id"],
        ordering: "created_at DESC, id DESC",
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "project",
        verbose_name: "Projects",
        table: "project",
        fields: PROJECT_FIELDS,
        list_display: &["title", "featured", "sort_order", "created_at"],
        computed: &[],
        search_fields: &["title", "description", "technologies"],
        list_filter: &["featured"],
        ordering: store::PROJECT_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "book",
        verbose_name: "Books",
        table: "book",
        fields: BOOK_FIELDS,
        list_display: &["title", "author", "category", "rating", "featured", "sort_order"],
        computed: &[],
        search_fields: &["title", "author", "review"],
        list_filter: &["category", "rating", "featured"],
        ordering: store::BOOK_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "study-note",
        verbose_name: "Study notes",
        table: "study_note",
        fields: STUDY_NOTE_FIELDS,
        list_display: &[
            "book_title",
            "book_author",
            "completed_chapters",
            "total_chapters",
            "progress",
            "featured",
        ],
        computed: &[(
            "progress",
            "(CASE WHEN total_chapters > 0 THEN completed_chapters * 100 / total_chapters ELSE 0 END) || '%'",
        )],
        search_fields: &["book_title", "book_author"],
        list_filter: &["featured"],
        ordering: store::STUDY_NOTE_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "study-chapter",
        verbose_name: "Study chapters",
        table: "study_chapter",
        fields: STUDY_CHAPTER_FIELDS,
        list_display: &["study_note_id", "chapter_number", "title", "status", "sort_order"],
        computed: &[],
        search_fields: &["title"],
        list_filter: &["status", "study_note_id"],
        ordering: store::CHAPTER_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "paper",
        verbose_name: "Papers",
        table: "paper",
        fields: PAPER_FIELDS,
        list_display: &["title", "category", "featured", "sort_order", "created_at"],
        computed: &[],
        search_fields: &["title", "authors", "summary"],
        list_filter: &["category", "featured"],
        ordering: store::PAPER_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "blog-post",
        verbose_name: "Blog posts",
        table: "blog_post",
        fields: BLOG_POST_FIELDS,
        list_display: &["title", "published_date", "featured", "sort_order"],
        computed: &[],
        search_fields: &["title", "description", "tags"],
        list_filter: &["featured"],
        ordering: store::BLOG_ORDERING,
        add_policy: AddPolicy::Allowed,
        can_delete: true,
        has_updated_at: true,
    },
    AdminModel {
        slug: "contact-message",
        verbose_name: "Contact messages",
        table: "contact_message",
        fields: CONTACT_MESSAGE_FIELDS,
        list_display: &["subject", "sender_email", "is_read", "created_at"],
        computed: &[],
        search_fields: &["subject", "sender_email", "message"],
        list_filter: &["is_read"],
        ordering: "created_at DESC, id DESC",
        add_policy: AddPolicy::Forbidden,
        can_delete: true,
        has_updated_at: false,
    },
    AdminModel {
        slug: "site-settings",
        verbose_name: "Site settings",
        table: "site_settings",
        fields: SITE_SETTINGS_FIELDS,
        list_display: &["site_title", "updated_at"],
        computed: &[],
        search_fields: &[],
        list_filter: &[],
        ordering: "id ASC",
        add_policy: AddPolicy::Singleton,
        can_delete: false,
        has_updated_at: true,
    },
];

pub fn find_model(slug: &str) -> Option<&'static AdminModel> {
    MODELS.iter().find(|m| m.slug == slug)
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Invalid(String),

    #[error("An error occurred. Please try again.")]
    Internal(#[from] PortfolioError),
}

impl From<sqlx::Error> for AdminError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return AdminError::Invalid("A record with these values already exists.".into());
            }
            if db_err.is_foreign_key_violation() {
                return AdminError::Invalid("The referenced record does not exist.".into());
            }
        }
        AdminError::Internal(PortfolioError::Database(e))
    }
}

impl AdminError {
    pub fn status_code(&self) -> u16 {
        match self {
            AdminError::NotFound(_) => 404,
            AdminError::Forbidden(_) => 403,
            AdminError::Invalid(_) => 400,
            AdminError::Internal(_) => 500,
        }
    }
}

pub type AdminResult<T> = Result<T, AdminError>;

/// JSON body returned by admin writes.
#[derive(Debug, Serialize)]
pub struct AdminEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

fn model_or_404(slug: &str) -> AdminResult<&'static AdminModel> {
    find_model(slug).ok_or_else(|| AdminError::NotFound(format!("Unknown model `{}`.", slug)))
}

fn is_url(s: &str) -> bool {
    (s.starts_with("http://") || s.starts_with("https://")) && !s.contains(char::is_whitespace)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check one submitted value against its field description.
pub fn validate_value(field: &Field, value: &Value) -> Result<SqlValue, String> {
    let name = field.name;
    let blank = match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if blank {
        if field.required {
            return Err(format!("`{}` is required.", name));
        }
        if field.nullable {
            return Ok(SqlValue::Null);
        }
        return match field.kind {
            FieldKind::Text | FieldKind::LongText | FieldKind::Url | FieldKind::Email => {
                Ok(SqlValue::Text(String::new()))
            }
            _ => Err(format!("`{}` needs a value.", name)),
        };
    }

    match field.kind {
        FieldKind::Text | FieldKind::LongText => match value {
            Value::String(s) => Ok(SqlValue::Text(s.trim().to_string())),
            _ => Err(format!("`{}` must be text.", name)),
        },
        FieldKind::Url => match value {
            Value::String(s) if is_url(s.trim()) => Ok(SqlValue::Text(s.trim().to_string())),
            _ => Err(format!("`{}` must be an http(s) URL.", name)),
        },
        FieldKind::Email => match value {
            Value::String(s) if EMAIL_RE.is_match(s.trim()) => {
                Ok(SqlValue::Text(s.trim().to_string()))
            }
            _ => Err(format!("`{}` must be an email address.", name)),
        },
        FieldKind::Integer { min, max } => {
            let n = as_integer(value).ok_or_else(|| format!("`{}` must be an integer.", name))?;
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(format!("`{}` is out of range.", name));
            }
            Ok(SqlValue::Integer(n))
        }
        FieldKind::ForeignKey(_) => as_integer(value)
            .map(SqlValue::Integer)
            .ok_or_else(|| format!("`{}` must be a record id.", name)),
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) if n.as_i64() == Some(0) || n.as_i64() == Some(1) => {
                Ok(SqlValue::Bool(n.as_i64() == Some(1)))
            }
            Value::String(s) => match s.trim() {
                "1" | "true" | "on" => Ok(SqlValue::Bool(true)),
                "0" | "false" | "off" => Ok(SqlValue::Bool(false)),
                _ => Err(format!("`{}` must be true or false.", name)),
            },
            _ => Err(format!("`{}` must be true or false.", name)),
        },
        FieldKind::Date => match value {
            Value::String(s) => chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| format!("`{}` must be a YYYY-MM-DD date.", name)),
            _ => Err(format!("`{}` must be a YYYY-MM-DD date.", name)),
        },
        FieldKind::DateTime => match value {
            Value::String(s) => parse_preferred_date(s)
                .map(SqlValue::Text)
                .ok_or_else(|| format!("`{}` must be an ISO-8601 date-time.", name)),
            _ => Err(format!("`{}` must be an ISO-8601 date-time.", name)),
        },
        FieldKind::Choice(choices) => match value {
            Value::String(s) if choices.iter().any(|(k, _)| *k == s.trim()) => {
                Ok(SqlValue::Text(s.trim().to_string()))
            }
            _ => Err(format!("`{}` is not a valid choice.", name)),
        },
        FieldKind::IntChoice(allowed) => match as_integer(value) {
            Some(n) if allowed.contains(&n) => Ok(SqlValue::Integer(n)),
            _ => Err(format!("`{}` is not a valid choice.", name)),
        },
    }
}

/// Validate a JSON object of field values for a write.
fn collect_values(
    model: &AdminModel,
    data: &Map<String, Value>,
) -> AdminResult<Vec<(&'static str, SqlValue)>> {
    let mut values = Vec::new();
    for (key, value) in data {
        let field = model
            .field(key)
            .ok_or_else(|| AdminError::Invalid(format!("Unknown field `{}`.", key)))?;
        if field.readonly {
            return Err(AdminError::Invalid(format!("Field `{}` is read-only.", key)));
        }
        let sql_value = validate_value(field, value).map_err(AdminError::Invalid)?;
        values.push((field.name, sql_value));
    }
    Ok(values)
}

fn parse_object(body: &[u8]) -> AdminResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(AdminError::Invalid("Invalid data format.".into())),
    }
}

fn parse_id(raw: &str) -> AdminResult<i64> {
    raw.parse()
        .map_err(|_| AdminError::NotFound(format!("No record with id `{}`.", raw)))
}

pub async fn create_record(db: &Db, model: &AdminModel, body: &[u8]) -> AdminResult<i64> {
    match model.add_policy {
        AddPolicy::Forbidden => {
            return Err(AdminError::Forbidden(format!(
                "Adding {} is not allowed.",
                model.verbose_name.to_lowercase()
            )));
        }
        AddPolicy::Singleton => {
            if store::count_rows(db, model.table).await? > 0 {
                return Err(AdminError::Invalid(format!(
                    "Only one {} record may exist.",
                    model.verbose_name.to_lowercase()
                )));
            }
        }
        AddPolicy::Allowed => {}
    }

    let data = parse_object(body)?;
    for field in model.fields.iter().filter(|f| f.required) {
        if !data.contains_key(field.name) {
            return Err(AdminError::Invalid(format!("`{}` is required.", field.name)));
        }
    }
    let values = collect_values(model, &data)?;

    let sql = if values.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", model.table)
    } else {
        let columns: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            model.table,
            columns.join(", "),
            placeholders
        )
    };
    let bound: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();
    let id = db.insert(&sql, &bound).await?;
    log::info!("Admin created {} {}", model.slug, id);
    Ok(id)
}

pub async fn update_record(db: &Db, model: &AdminModel, id: i64, body: &[u8]) -> AdminResult<()> {
    let data = parse_object(body)?;
    let values = collect_values(model, &data)?;
    if values.is_empty() {
        return Err(AdminError::Invalid("Nothing to update.".into()));
    }

    let mut assignments: Vec<String> = values
        .iter()
        .map(|(name, _)| format!("{} = ?", name))
        .collect();
    if model.has_updated_at {
        assignments.push("updated_at = CURRENT_TIMESTAMP".to_string());
    }
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?",
        model.table,
        assignments.join(", ")
    );
    let mut bound: Vec<SqlValue> = values.into_iter().map(|(_, v)| v).collect();
    bound.push(SqlValue::Integer(id));
    if db.execute_with(&sql, &bound).await? == 0 {
        return Err(AdminError::NotFound(format!("No record with id `{}`.", id)));
    }
    log::info!("Admin updated {} {}", model.slug, id);
    Ok(())
}

pub async fn delete_record(db: &Db, model: &AdminModel, id: i64) -> AdminResult<()> {
    if !model.can_delete {
        return Err(AdminError::Forbidden(format!(
            "Deleting {} is not allowed.",
            model.verbose_name.to_lowercase()
        )));
    }
    let sql = format!("DELETE FROM {} WHERE id = ?", model.table);
    if db.execute_with(&sql, &[SqlValue::Integer(id)]).await? == 0 {
        return Err(AdminError::NotFound(format!("No record with id `{}`.", id)));
    }
    log::info!("Admin deleted {} {}", model.slug, id);
    Ok(())
}

fn json_object_sql(pairs: &[(String, String)]) -> String {
    let args: Vec<String> = pairs
        .iter()
        .map(|(name, expr)| format!("'{}', {}", name, expr))
        .collect();
    format!("json_object({})", args.join(", "))
}

/// Turn stored 0/1 flags back into JSON booleans.
fn restore_flags(model: &AdminModel, mut row: Value) -> Value {
    if let Value::Object(map) = &mut row {
        for field in model.fields.iter().filter(|f| matches!(f.kind, FieldKind::Bool)) {
            if let Some(v) = map.get_mut(field.name) {
                if let Some(n) = v.as_i64() {
                    *v = Value::Bool(n != 0);
                }
            }
        }
    }
    row
}

async fn fetch_json_rows(
    db: &Db,
    model: &AdminModel,
    select: &str,
    filter_sql: &str,
    values: &[SqlValue],
) -> AdminResult<Vec<Value>> {
    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select, model.table, filter_sql, model.ordering
    );
    let rows: Vec<(String,)> = db.fetch_all_with(&sql, values).await?;
    rows.into_iter()
        .map(|(raw,)| {
            serde_json::from_str(&raw)
                .map(|row| restore_flags(model, row))
                .map_err(|e| AdminError::Internal(PortfolioError::Serialization(e)))
        })
        .collect()
}

pub async fn fetch_record(db: &Db, model: &AdminModel, id: i64) -> AdminResult<Value> {
    let mut pairs = vec![("id".to_string(), "id".to_string())];
    pairs.extend(
        model
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.name.to_string())),
    );
    pairs.push(("created_at".to_string(), "created_at".to_string()));
    if model.has_updated_at {
        pairs.push(("updated_at".to_string(), "updated_at".to_string()));
    }
    let rows = fetch_json_rows(
        db,
        model,
        &json_object_sql(&pairs),
        " WHERE id = ?",
        &[SqlValue::Integer(id)],
    )
    .await?;
    rows.into_iter()
        .next()
        .ok_or_else(|| AdminError::NotFound(format!("No record with id `{}`.", id)))
}

/// Search text and exact-match filters for a list page.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn from_query(model: &AdminModel, query: &HashMap<String, String>) -> Self {
        let search = query
            .get("q")
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let filters = model
            .list_filter
            .iter()
            .filter_map(|name| {
                query
                    .get(*name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.to_string(), v.clone()))
            })
            .collect();
        ListQuery { search, filters }
    }
}

fn filter_value(model: &AdminModel, name: &str, raw: &str) -> SqlValue {
    match model.field(name).map(|f| f.kind) {
        Some(FieldKind::Bool) => SqlValue::Bool(matches!(raw, "1" | "true" | "on")),
        Some(FieldKind::Integer { .. })
        | Some(FieldKind::IntChoice(_))
        | Some(FieldKind::ForeignKey(_)) => raw
            .parse()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(raw.to_string())),
        _ => SqlValue::Text(raw.to_string()),
    }
}

/// Make `%`, `_` and `\` match literally under `ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Rows for a list page: `id` plus the `list_display` columns.
pub async fn list_records(db: &Db, model: &AdminModel, query: &ListQuery) -> AdminResult<Vec<Value>> {
    let mut pairs = vec![("id".to_string(), "id".to_string())];
    for name in model.list_display {
        let expr = model
            .computed
            .iter()
            .find(|(computed, _)| computed == name)
            .map(|(_, expr)| expr.to_string())
            .unwrap_or_else(|| name.to_string());
        pairs.push((name.to_string(), expr));
    }

    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(search) = &query.search {
        if !model.search_fields.is_empty() {
            let likes: Vec<String> = model
                .search_fields
                .iter()
                .map(|f| format!("{} LIKE ? ESCAPE '\\'", f))
                .collect();
            clauses.push(format!("({})", likes.join(" OR ")));
            let pattern = format!("%{}%", escape_like(search));
            for _ in model.search_fields {
                values.push(SqlValue::Text(pattern.clone()));
            }
        }
    }
    for (name, raw) in &query.filters {
        // Names come from `list_filter`, never from the request.
        if let Some(known) = model.list_filter.iter().find(|f| **f == name.as_str()) {
            clauses.push(format!("{} = ?", known));
            values.push(filter_value(model, known, raw));
        }
    }
    let filter_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    fetch_json_rows(db, model, &json_object_sql(&pairs), &filter_sql, &values).await
}

/// Render a list cell: choice labels, Yes/No flags, `-` for empty.
pub fn display_cell(model: &AdminModel, column: &str, value: Option<&Value>) -> String {
    let kind = model.field(column).map(|f| f.kind);
    match (kind, value) {
        (_, None) | (_, Some(Value::Null)) => "-".to_string(),
        (Some(FieldKind::Bool), Some(v)) => {
            let on = v.as_bool().unwrap_or_else(|| v.as_i64() == Some(1));
            if on { "Yes" } else { "No" }.to_string()
        }
        (Some(FieldKind::Choice(choices)), Some(Value::String(s))) => choice_label(choices, s),
        (_, Some(Value::String(s))) if s.is_empty() => "-".to_string(),
        (_, Some(Value::String(s))) => s.clone(),
        (_, Some(v)) => v.to_string(),
    }
}

fn envelope(status: u16, success: bool, message: String, id: Option<i64>) -> Response {
    Response::json(
        AdminEnvelope {
            success,
            message,
            id,
        },
        status,
        HashMap::new(),
    )
}

fn error_response(e: AdminError) -> Response {
    if let AdminError::Internal(inner) = &e {
        log::error!("Admin request failed: {}", inner);
    }
    envelope(e.status_code(), false, e.to_string(), None)
}

fn query_pair(name: &str, value: &str) -> String {
    format!(
        "{}={}",
        utf8_percent_encode(name, NON_ALPHANUMERIC),
        utf8_percent_encode(value, NON_ALPHANUMERIC)
    )
}

/// Query string carrying the admin token on to linked admin pages.
fn token_param(request: &Request) -> String {
    request
        .query_param("token")
        .map(|t| query_pair("token", t))
        .unwrap_or_default()
}

fn join_query(parts: &[String]) -> String {
    let parts: Vec<&str> = parts
        .iter()
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

fn render_admin(state: &AppState, template: &str, context: &Context) -> Response {
    render_template(Path::new(&state.settings.template.dir), template, context)
}

pub async fn index(request: Request, state: AppState) -> Response {
    let mut models = Vec::with_capacity(MODELS.len());
    for model in MODELS {
        let count = match store::count_rows(&state.db, model.table).await {
            Ok(count) => count,
            Err(e) => return error_response(AdminError::Internal(e)),
        };
        models.push(
            TemplateValue::Object(Default::default())
                .with("slug", model.slug)
                .with("verbose_name", model.verbose_name)
                .with("count", count),
        );
    }
    let mut context = Context::new();
    context.insert("models".to_string(), TemplateValue::List(models));
    context.insert(
        "query".to_string(),
        join_query(&[token_param(&request)]).into(),
    );
    render_admin(&state, "admin/index.html", &context)
}

fn filter_options(model: &AdminModel, name: &str, selected: Option<&str>, token: &str) -> Vec<TemplateValue> {
    let options: Vec<(String, String)> = match model.field(name).map(|f| f.kind) {
        Some(FieldKind::Choice(choices)) => choices
            .iter()
            .map(|(k, l)| (k.to_string(), l.to_string()))
            .collect(),
        Some(FieldKind::Bool) => vec![("1".into(), "Yes".into()), ("0".into(), "No".into())],
        Some(FieldKind::IntChoice(allowed)) => {
            allowed.iter().map(|n| (n.to_string(), n.to_string())).collect()
        }
        _ => Vec::new(),
    };
    options
        .into_iter()
        .map(|(value, label)| {
            TemplateValue::Object(Default::default())
                .with("selected", selected == Some(value.as_str()))
                .with(
                    "query",
                    join_query(&[query_pair(name, &value), token.to_string()]),
                )
                .with("label", label)
        })
        .collect()
}

pub async fn list_view(request: Request, state: AppState) -> Response {
    let model = match model_or_404(request.params.get("model").map(String::as_str).unwrap_or("")) {
        Ok(model) => model,
        Err(e) => return error_response(e),
    };
    let query = ListQuery::from_query(model, &request.query);
    let rows = match list_records(&state.db, model, &query).await {
        Ok(rows) => rows,
        Err(e) => return error_response(e),
    };

    let token = token_param(&request);
    let rows: Vec<TemplateValue> = rows
        .iter()
        .map(|row| {
            let cells: Vec<TemplateValue> = model
                .list_display
                .iter()
                .map(|col| display_cell(model, col, row.get(*col)).into())
                .collect();
            TemplateValue::Object(Default::default())
                .with("id", row.get("id").and_then(Value::as_i64).unwrap_or_default())
                .with("cells", TemplateValue::List(cells))
        })
        .collect();
    let filters: Vec<TemplateValue> = model
        .list_filter
        .iter()
        .map(|name| {
            let selected = query
                .filters
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str());
            TemplateValue::Object(Default::default())
                .with("name", *name)
                .with(
                    "options",
                    TemplateValue::List(filter_options(model, name, selected, &token)),
                )
        })
        .collect();

    let mut context = Context::new();
    context.insert("slug".to_string(), model.slug.into());
    context.insert("verbose_name".to_string(), model.verbose_name.into());
    context.insert(
        "columns".to_string(),
        TemplateValue::List(model.list_display.iter().map(|c| (*c).into()).collect()),
    );
    context.insert("rows".to_string(), TemplateValue::List(rows));
    context.insert("filters".to_string(), TemplateValue::List(filters));
    context.insert(
        "search".to_string(),
        query.search.clone().unwrap_or_default().into(),
    );
    context.insert(
        "searchable".to_string(),
        (!model.search_fields.is_empty()).into(),
    );
    context.insert("query".to_string(), join_query(&[token]).into());
    context.insert("token".to_string(), request.query_param("token").into());
    render_admin(&state, "admin/list.html", &context)
}

fn model_and_id(request: &Request) -> AdminResult<(&'static AdminModel, i64)> {
    let model = model_or_404(request.params.get("model").map(String::as_str).unwrap_or(""))?;
    let id = parse_id(request.params.get("id").map(String::as_str).unwrap_or(""))?;
    Ok((model, id))
}

pub async fn detail(request: Request, state: AppState) -> Response {
    let result = async {
        let (model, id) = model_and_id(&request)?;
        fetch_record(&state.db, model, id).await
    }
    .await;
    match result {
        Ok(record) => Response::json(record, 200, HashMap::new()),
        Err(e) => error_response(e),
    }
}

pub async fn create(request: Request, state: AppState) -> Response {
    let result = async {
        let model = model_or_404(request.params.get("model").map(String::as_str).unwrap_or(""))?;
        create_record(&state.db, model, &request.body).await
    }
    .await;
    match result {
        Ok(id) => envelope(201, true, "Created.".to_string(), Some(id)),
        Err(e) => error_response(e),
    }
}

pub async fn update(request: Request, state: AppState) -> Response {
    let result = async {
        let (model, id) = model_and_id(&request)?;
        update_record(&state.db, model, id, &request.body).await?;
        Ok::<i64, AdminError>(id)
    }
    .await;
    match result {
        Ok(id) => envelope(200, true, "Updated.".to_string(), Some(id)),
        Err(e) => error_response(e),
    }
}

pub async fn delete(request: Request, state: AppState) -> Response {
    let result = async {
        let (model, id) = model_and_id(&request)?;
        delete_record(&state.db, model, id).await?;
        Ok::<i64, AdminError>(id)
    }
    .await;
    match result {
        Ok(id) => envelope(200, true, "Deleted.".to_string(), Some(id)),
        Err(e) => error_response(e),
    }
}
