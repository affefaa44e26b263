//! Read and write queries over the content store.

use crate::error::Result;
use crate::models::{
    AppointmentType, BlogPost, Book, Paper, Profile, Project, SiteSettings, Skill, StudyChapter,
    StudyNote,
};
use crate::orm::{Db, SqlValue};

/// A slice of one collection: optionally featured-only, optionally one
/// category, optionally bounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub featured_only: bool,
    pub category: Option<String>,
    pub limit: Option<u32>,
}

impl Listing {
    pub fn all() -> Self {
        Listing::default()
    }

    pub fn featured(limit: u32) -> Self {
        Listing {
            featured_only: true,
            category: None,
            limit: Some(limit),
        }
    }

    /// Filter by category; blank values mean no filter.
    pub fn in_category(category: Option<&str>) -> Self {
        Listing {
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            ..Listing::default()
        }
    }
}

fn listing_sql(table: &str, ordering: &str, listing: &Listing) -> (String, Vec<SqlValue>) {
    let mut sql = format!("SELECT * FROM {}", table);
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if listing.featured_only {
        clauses.push("featured = 1");
    }
    if let Some(category) = &listing.category {
        clauses.push("category = ?");
        values.push(SqlValue::Text(category.clone()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(ordering);
    if let Some(limit) = listing.limit {
        sql.push_str(" LIMIT ?");
        values.push(SqlValue::Integer(limit as i64));
    }
    (sql, values)
}

pub const PROJECT_ORDERING: &str = "sort_order ASC, created_at DESC, id DESC";
pub const BOOK_ORDERING: &str = "sort_order ASC, created_at DESC, id DESC";
pub const PAPER_ORDERING: &str = "sort_order ASC, created_at DESC, id DESC";
pub const BLOG_ORDERING: &str = "sort_order ASC, published_date DESC, id DESC";
pub const SKILL_ORDERING: &str = "category ASC, sort_order ASC, name ASC";
pub const APPOINTMENT_TYPE_ORDERING: &str = "sort_order ASC, name ASC";
pub const STUDY_NOTE_ORDERING: &str = "featured DESC, updated_at DESC, id DESC";
pub const CHAPTER_ORDERING: &str = "study_note_id ASC, sort_order ASC, chapter_number ASC";

pub async fn first_profile(db: &Db) -> Result<Option<Profile>> {
    Ok(db
        .fetch_optional_with("SELECT * FROM profile ORDER BY id LIMIT 1", &[])
        .await?)
}

pub async fn first_site_settings(db: &Db) -> Result<Option<SiteSettings>> {
    Ok(db
        .fetch_optional_with("SELECT * FROM site_settings ORDER BY id LIMIT 1", &[])
        .await?)
}

pub async fn projects(db: &Db, listing: &Listing) -> Result<Vec<Project>> {
    // Projects carry no category.
    let listing = Listing {
        category: None,
        ..listing.clone()
    };
    let (sql, values) = listing_sql("project", PROJECT_ORDERING, &listing);
    Ok(db.fetch_all_with(&sql, &values).await?)
}

pub async fn books(db: &Db, listing: &Listing) -> Result<Vec<Book>> {
    let (sql, values) = listing_sql("book", BOOK_ORDERING, listing);
    Ok(db.fetch_all_with(&sql, &values).await?)
}

pub async fn papers(db: &Db, listing: &Listing) -> Result<Vec<Paper>> {
    let (sql, values) = listing_sql("paper", PAPER_ORDERING, listing);
    Ok(db.fetch_all_with(&sql, &values).await?)
}

pub async fn blog_posts(db: &Db, listing: &Listing) -> Result<Vec<BlogPost>> {
    let listing = Listing {
        category: None,
        ..listing.clone()
    };
    let (sql, values) = listing_sql("blog_post", BLOG_ORDERING, &listing);
    Ok(db.fetch_all_with(&sql, &values).await?)
}

pub async fn featured_skills(db: &Db) -> Result<Vec<Skill>> {
    let sql = format!(
        "SELECT * FROM skill WHERE is_featured = 1 ORDER BY {}",
        SKILL_ORDERING
    );
    Ok(db.fetch_all_with(&sql, &[]).await?)
}

/// Skills sharing one category, labelled for display.
#[derive(Debug, Clone)]
pub struct SkillGroup {
    pub category: String,
    pub label: String,
    pub skills: Vec<Skill>,
}

/// Group consecutive skills by category. Input order is kept, so skills
/// sorted by category come out as one group per category.
pub fn group_skills_by_category(skills: Vec<Skill>) -> Vec<SkillGroup> {
    let mut groups: Vec<SkillGroup> = Vec::new();
    for skill in skills {
        match groups.iter_mut().find(|g| g.category == skill.category) {
            Some(group) => group.skills.push(skill),
            None => groups.push(SkillGroup {
                category: skill.category.clone(),
                label: skill.category_display(),
                skills: vec![skill],
            }),
        }
    }
    groups
}

pub async fn active_appointment_types(db: &Db) -> Result<Vec<AppointmentType>> {
    let sql = format!(
        "SELECT * FROM appointment_type WHERE is_active = 1 ORDER BY {}",
        APPOINTMENT_TYPE_ORDERING
    );
    Ok(db.fetch_all_with(&sql, &[]).await?)
}

/// Look up an appointment type that is still offered.
pub async fn active_appointment_type(db: &Db, id: i64) -> Result<Option<AppointmentType>> {
    Ok(db
        .fetch_optional_with(
            "SELECT * FROM appointment_type WHERE id = ? AND is_active = 1",
            &[SqlValue::Integer(id)],
        )
        .await?)
}

pub async fn featured_study_notes(db: &Db) -> Result<Vec<StudyNote>> {
    let sql = format!(
        "SELECT * FROM study_note WHERE featured = 1 ORDER BY {}",
        STUDY_NOTE_ORDERING
    );
    Ok(db.fetch_all_with(&sql, &[]).await?)
}

pub async fn chapters_for(db: &Db, study_note_id: i64) -> Result<Vec<StudyChapter>> {
    let sql = format!(
        "SELECT * FROM study_chapter WHERE study_note_id = ? ORDER BY {}",
        CHAPTER_ORDERING
    );
    Ok(db
        .fetch_all_with(&sql, &[SqlValue::Integer(study_note_id)])
        .await?)
}

/// A contact form submission ready to be stored.
#[derive(Debug, Clone)]
pub struct NewContactMessage {
    pub sender_email: String,
    pub subject: String,
    pub message: String,
}

pub async fn insert_contact_message(db: &Db, new: &NewContactMessage) -> Result<i64> {
    Ok(db
        .insert(
            "INSERT INTO contact_message (sender_email, subject, message) VALUES (?, ?, ?)",
            &[
                new.sender_email.as_str().into(),
                new.subject.as_str().into(),
                new.message.as_str().into(),
            ],
        )
        .await?)
}

/// An appointment request ready to be stored with status `pending`.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub appointment_type_id: i64,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub company: String,
    pub purpose: String,
    pub preferred_date: Option<String>,
}

pub async fn insert_appointment(db: &Db, new: &NewAppointment) -> Result<i64> {
    Ok(db
        .insert(
            "INSERT INTO appointment (appointment_type_id, client_name, client_email, \
             client_phone, company, purpose, preferred_date, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')",
            &[
                SqlValue::Integer(new.appointment_type_id),
                new.client_name.as_str().into(),
                new.client_email.as_str().into(),
                new.client_phone.as_str().into(),
                new.company.as_str().into(),
                new.purpose.as_str().into(),
                new.preferred_date.clone().into(),
            ],
        )
        .await?)
}

pub async fn count_rows(db: &Db, table: &str) -> Result<i64> {
    let row: (i64,) = db
        .fetch_optional_with(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await?
        .unwrap_or((0,));
    Ok(row.0)
}
