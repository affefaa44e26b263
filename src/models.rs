//! Content store entities.
//!
//! Every entity is a flat row with an integer `id`; each one implements
//! [`Model`] for schema management and is registered for [`migrate`].

use serde::Serialize;
use sqlx::FromRow;
use std::sync::Arc;

use crate::orm::{self, BoxFuture, Db, Model};
use crate::register_model;

pub type Choices = &'static [(&'static str, &'static str)];

pub const SKILL_CATEGORIES: Choices = &[
    ("languages", "Programming Languages"),
    ("frameworks", "Frameworks & Libraries"),
    ("databases", "Databases"),
    ("cloud_devops", "Cloud & DevOps"),
    ("tools", "Tools & Technologies"),
    ("other", "Other"),
];

pub const BOOK_CATEGORIES: Choices = &[
    ("technical", "Technical"),
    ("business", "Business"),
    ("personal_development", "Personal Development"),
    ("fiction", "Fiction"),
    ("non_fiction", "Non-Fiction"),
    ("other", "Other"),
];

pub const PAPER_CATEGORIES: Choices = &[
    ("databases", "Databases & Storage Systems"),
    ("systems", "Systems & Performance"),
    ("ai", "AI & Machine Learning"),
    ("distributed", "Distributed Systems"),
    ("security", "Security"),
    ("other", "Other"),
];

pub const APPOINTMENT_STATUSES: Choices = &[
    ("pending", "Pending"),
    ("confirmed", "Confirmed"),
    ("completed", "Completed"),
    ("cancelled", "Cancelled"),
    ("no_show", "No Show"),
];

pub const CHAPTER_STATUSES: Choices = &[
    ("completed", "Completed"),
    ("in_progress", "In Progress"),
    ("planned", "Planned"),
];

/// Allowed appointment lengths in minutes.
pub const APPOINTMENT_DURATIONS: &[i64] = &[15, 30, 45, 60, 90, 120];

/// Label for a choice key, falling back to the key itself.
pub fn choice_label(choices: Choices, key: &str) -> String {
    choices
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn cols(spec: &[(&str, &str)]) -> Vec<(String, String)> {
    spec.iter()
        .map(|(name, ty)| (name.to_string(), ty.to_string()))
        .collect()
}

const TEXT: &str = "TEXT NOT NULL DEFAULT ''";
const NULL_TEXT: &str = "TEXT";
const FLAG_OFF: &str = "BOOLEAN NOT NULL DEFAULT 0";
const FLAG_ON: &str = "BOOLEAN NOT NULL DEFAULT 1";
const SORT: &str = "INTEGER NOT NULL DEFAULT 0";
const CREATED: &str = "DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP";
const UPDATED: &str = "DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub bio: String,
    pub profile_image: Option<String>,
    pub email: String,
    pub phone: String,
    pub github_url: String,
    pub linkedin_url: String,
    pub medium_url: String,
    pub newsletter_url: String,
    pub newsletter_title: String,
    pub newsletter_description: String,
    pub resume_url: String,
    pub calendly_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Model for Profile {
    fn table_name() -> &'static str {
        "profile"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("name", TEXT),
            ("title", TEXT),
            ("bio", TEXT),
            ("profile_image", NULL_TEXT),
            ("email", TEXT),
            ("phone", TEXT),
            ("github_url", TEXT),
            ("linkedin_url", TEXT),
            ("medium_url", TEXT),
            ("newsletter_url", TEXT),
            ("newsletter_title", TEXT),
            ("newsletter_description", TEXT),
            ("resume_url", TEXT),
            ("calendly_url", TEXT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub icon_class: String,
    pub proficiency_level: i64,
    pub years_experience: Option<i64>,
    pub is_featured: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Skill {
    pub fn category_display(&self) -> String {
        choice_label(SKILL_CATEGORIES, &self.category)
    }

    pub fn proficiency_display_text(&self) -> &'static str {
        match self.proficiency_level {
            1 => "Beginner",
            2 => "Intermediate",
            3 => "Advanced",
            4 => "Expert",
            _ => "Unknown",
        }
    }
}

impl Model for Skill {
    fn table_name() -> &'static str {
        "skill"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("name", "TEXT NOT NULL"),
            ("category", "TEXT NOT NULL DEFAULT 'languages'"),
            ("icon_class", TEXT),
            ("proficiency_level", "INTEGER NOT NULL DEFAULT 3"),
            ("years_experience", "INTEGER"),
            ("is_featured", FLAG_ON),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }

    fn table_constraints() -> Vec<String> {
        vec!["UNIQUE (name, category)".to_string()]
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentType {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration: i64,
    pub calendly_event_type: String,
    pub price_cents: i64,
    pub is_active: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl AppointmentType {
    pub fn price_display(&self) -> String {
        if self.price_cents == 0 {
            return "Free".to_string();
        }
        format!("${}.{:02}", self.price_cents / 100, self.price_cents % 100)
    }
}

impl Model for AppointmentType {
    fn table_name() -> &'static str {
        "appointment_type"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("name", "TEXT NOT NULL"),
            ("description", TEXT),
            ("duration", "INTEGER NOT NULL DEFAULT 30"),
            ("calendly_event_type", TEXT),
            ("price_cents", "INTEGER NOT NULL DEFAULT 0"),
            ("is_active", FLAG_ON),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: i64,
    pub appointment_type_id: i64,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub company: String,
    pub purpose: String,
    pub preferred_date: Option<String>,
    pub scheduled_date: Option<String>,
    pub status: String,
    pub calendly_event_id: String,
    pub google_meet_link: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Model for Appointment {
    fn table_name() -> &'static str {
        "appointment"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            (
                "appointment_type_id",
                "INTEGER NOT NULL REFERENCES appointment_type(id) ON DELETE CASCADE",
            ),
            ("client_name", "TEXT NOT NULL"),
            ("client_email", "TEXT NOT NULL"),
            ("client_phone", TEXT),
            ("company", TEXT),
            ("purpose", TEXT),
            ("preferred_date", NULL_TEXT),
            ("scheduled_date", NULL_TEXT),
            ("status", "TEXT NOT NULL DEFAULT 'pending'"),
            ("calendly_event_id", TEXT),
            ("google_meet_link", TEXT),
            ("notes", TEXT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub github_url: String,
    pub live_url: Option<String>,
    pub image: Option<String>,
    pub technologies: String,
    pub featured: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn technologies_list(&self) -> Vec<String> {
        split_csv(&self.technologies)
    }
}

impl Model for Project {
    fn table_name() -> &'static str {
        "project"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("title", "TEXT NOT NULL"),
            ("description", TEXT),
            ("github_url", TEXT),
            ("live_url", NULL_TEXT),
            ("image", NULL_TEXT),
            ("technologies", TEXT),
            ("featured", FLAG_OFF),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub category: String,
    pub goodreads_url: String,
    pub notes_url: Option<String>,
    pub cover_image: Option<String>,
    pub rating: Option<i64>,
    pub review: String,
    pub featured: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    pub fn category_display(&self) -> String {
        choice_label(BOOK_CATEGORIES, &self.category)
    }
}

impl Model for Book {
    fn table_name() -> &'static str {
        "book"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("title", "TEXT NOT NULL"),
            ("author", TEXT),
            ("category", "TEXT NOT NULL DEFAULT 'technical'"),
            ("goodreads_url", TEXT),
            ("notes_url", NULL_TEXT),
            ("cover_image", NULL_TEXT),
            ("rating", "INTEGER"),
            ("review", TEXT),
            ("featured", FLAG_OFF),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudyNote {
    pub id: i64,
    pub book_title: String,
    pub book_author: String,
    pub book_description: String,
    pub book_cover_url: String,
    pub total_chapters: i64,
    pub completed_chapters: i64,
    pub featured: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl StudyNote {
    /// Completed share of chapters as a whole percentage, rounded down.
    pub fn progress_percentage(&self) -> i64 {
        if self.total_chapters <= 0 {
            return 0;
        }
        self.completed_chapters * 100 / self.total_chapters
    }
}

impl Model for StudyNote {
    fn table_name() -> &'static str {
        "study_note"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("book_title", "TEXT NOT NULL"),
            ("book_author", TEXT),
            ("book_description", TEXT),
            ("book_cover_url", TEXT),
            ("total_chapters", "INTEGER NOT NULL DEFAULT 0"),
            ("completed_chapters", "INTEGER NOT NULL DEFAULT 0"),
            ("featured", FLAG_OFF),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudyChapter {
    pub id: i64,
    pub study_note_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub notes_url: String,
    pub code_examples_url: String,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl StudyChapter {
    pub fn status_display(&self) -> String {
        choice_label(CHAPTER_STATUSES, &self.status)
    }
}

impl Model for StudyChapter {
    fn table_name() -> &'static str {
        "study_chapter"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            (
                "study_note_id",
                "INTEGER NOT NULL REFERENCES study_note(id) ON DELETE CASCADE",
            ),
            ("chapter_number", "INTEGER NOT NULL"),
            ("title", "TEXT NOT NULL"),
            ("description", TEXT),
            ("status", "TEXT NOT NULL DEFAULT 'planned'"),
            ("notes_url", TEXT),
            ("code_examples_url", TEXT),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }

    fn table_constraints() -> Vec<String> {
        vec!["UNIQUE (study_note_id, chapter_number)".to_string()]
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Paper {
    pub id: i64,
    pub title: String,
    pub authors: String,
    pub category: String,
    pub paper_url: String,
    pub notes_url: Option<String>,
    pub summary: String,
    pub key_insights: String,
    pub featured: bool,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Paper {
    pub fn category_display(&self) -> String {
        choice_label(PAPER_CATEGORIES, &self.category)
    }
}

impl Model for Paper {
    fn table_name() -> &'static str {
        "paper"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("title", "TEXT NOT NULL"),
            ("authors", TEXT),
            ("category", "TEXT NOT NULL DEFAULT 'other'"),
            ("paper_url", TEXT),
            ("notes_url", NULL_TEXT),
            ("summary", TEXT),
            ("key_insights", TEXT),
            ("featured", FLAG_OFF),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BlogPost {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub medium_url: String,
    pub image: Option<String>,
    pub tags: String,
    pub featured: bool,
    pub published_date: String,
    pub sort_order: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl BlogPost {
    pub fn tags_list(&self) -> Vec<String> {
        split_csv(&self.tags)
    }
}

impl Model for BlogPost {
    fn table_name() -> &'static str {
        "blog_post"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("title", "TEXT NOT NULL"),
            ("description", TEXT),
            ("medium_url", TEXT),
            ("image", NULL_TEXT),
            ("tags", TEXT),
            ("featured", FLAG_OFF),
            ("published_date", "DATE NOT NULL DEFAULT CURRENT_DATE"),
            ("sort_order", SORT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ContactMessage {
    pub id: i64,
    pub sender_email: String,
    pub subject: String,
    pub message: String,
    pub created_at: String,
    pub is_read: bool,
}

impl Model for ContactMessage {
    fn table_name() -> &'static str {
        "contact_message"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("sender_email", "TEXT NOT NULL"),
            ("subject", "TEXT NOT NULL"),
            ("message", "TEXT NOT NULL"),
            ("created_at", CREATED),
            ("is_read", FLAG_OFF),
        ])
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteSettings {
    pub id: i64,
    pub site_title: String,
    pub meta_description: String,
    pub google_analytics_id: String,
    pub footer_text: String,
    pub google_calendar_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Model for SiteSettings {
    fn table_name() -> &'static str {
        "site_settings"
    }

    fn columns() -> Vec<(String, String)> {
        cols(&[
            ("site_title", "TEXT NOT NULL DEFAULT 'Portfolio'"),
            ("meta_description", TEXT),
            ("google_analytics_id", TEXT),
            ("footer_text", "TEXT NOT NULL DEFAULT 'All rights reserved.'"),
            ("google_calendar_id", TEXT),
            ("created_at", CREATED),
            ("updated_at", UPDATED),
        ])
    }
}

register_model!(Profile);
register_model!(Skill);
register_model!(AppointmentType);
register_model!(Appointment);
register_model!(Project);
register_model!(Book);
register_model!(StudyNote);
register_model!(StudyChapter);
register_model!(Paper);
register_model!(BlogPost);
register_model!(ContactMessage);
register_model!(SiteSettings);

/// Create or update the tables of every registered model.
pub fn migrate(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    Box::pin(orm::auto_migrate(db))
}
