#![allow(dead_code)]

use async_trait::async_trait;
use portfolio::mail::{Email, MailError, Mailer, MemoryMailer};
use portfolio::models;
use portfolio::orm::{Db, SqlValue};
use portfolio::router::AppState;
use portfolio::settings::Settings;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub async fn memory_db() -> Arc<Db> {
    let db = Arc::new(Db::connect("sqlite::memory:").await.unwrap());
    models::migrate(db.clone()).await.unwrap();
    db
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.template.dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("templates")
        .to_string_lossy()
        .into_owned();
    settings.static_dir = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("static")
        .to_string_lossy()
        .into_owned();
    settings.admin_token = Some("secret".to_string());
    settings.email.contact_email = "owner@example.com".to_string();
    settings.email.default_from = "site@example.com".to_string();
    settings
}

pub async fn state_with(mailer: Arc<dyn Mailer>) -> AppState {
    AppState::new(memory_db().await, test_settings(), mailer)
}

pub async fn memory_state() -> (AppState, MemoryMailer) {
    let mailer = MemoryMailer::new();
    (state_with(Arc::new(mailer.clone())).await, mailer)
}

/// Fails deliveries with a fixed error, recording what it was asked to send.
/// The first `successes` deliveries go through.
pub struct FailingMailer {
    pub error: MailError,
    pub successes: usize,
    pub attempts: Mutex<Vec<Email>>,
}

impl FailingMailer {
    pub fn new(error: MailError) -> Arc<Self> {
        Self::failing_after(0, error)
    }

    pub fn failing_after(successes: usize, error: MailError) -> Arc<Self> {
        Arc::new(FailingMailer {
            error,
            successes,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for FailingMailer {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, email: &Email) -> Result<(), MailError> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(email.clone());
        if attempts.len() <= self.successes {
            Ok(())
        } else {
            Err(self.error.clone())
        }
    }
}

pub async fn count(db: &Db, table: &str) -> i64 {
    portfolio::store::count_rows(db, table).await.unwrap()
}

pub async fn seed_appointment_type(db: &Db, name: &str, active: bool) -> i64 {
    db.insert(
        "INSERT INTO appointment_type (name, description, duration, price_cents, is_active) \
         VALUES (?, 'A chat', 30, 0, ?)",
        &[name.into(), SqlValue::Bool(active)],
    )
    .await
    .unwrap()
}

pub async fn seed_project(db: &Db, title: &str, featured: bool, sort_order: i64) -> i64 {
    db.insert(
        "INSERT INTO project (title, description, github_url, technologies, featured, sort_order) \
         VALUES (?, 'desc', 'https://github.com/x', 'Rust, , SQLite', ?, ?)",
        &[title.into(), SqlValue::Bool(featured), SqlValue::Integer(sort_order)],
    )
    .await
    .unwrap()
}

pub async fn seed_book(db: &Db, title: &str, category: &str, featured: bool) -> i64 {
    db.insert(
        "INSERT INTO book (title, author, category, goodreads_url, featured) \
         VALUES (?, 'Someone', ?, 'https://goodreads.com/b', ?)",
        &[title.into(), category.into(), SqlValue::Bool(featured)],
    )
    .await
    .unwrap()
}

pub async fn seed_profile(db: &Db, name: &str) -> i64 {
    db.insert(
        "INSERT INTO profile (name, title, bio, email) VALUES (?, 'Engineer', '<b>Hi</b>', 'me@example.com')",
        &[name.into()],
    )
    .await
    .unwrap()
}
