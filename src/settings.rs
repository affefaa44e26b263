use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub dir: String,
    pub debug: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        TemplateSettings {
            dir: "templates".to_string(),
            debug: false,
        }
    }
}

/// Which mail gateway to use. `console` logs outgoing mail, `memory` keeps it
/// in process, `smtp` delivers it.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailBackend {
    Console,
    Memory,
    Smtp,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub backend: EmailBackend,
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_from: String,
    /// Where owner notifications are delivered.
    pub contact_email: String,
    /// Signature used in confirmation mails.
    pub owner_name: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        EmailSettings {
            backend: EmailBackend::Console,
            host: "localhost".to_string(),
            port: 587,
            use_tls: true,
            username: None,
            password: None,
            default_from: "webmaster@localhost".to_string(),
            contact_email: "owner@localhost".to_string(),
            owner_name: "Portfolio".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub ws_port: u16,
    pub database_url: String,
    pub migrations_dir: Option<String>,
    pub static_dir: String,
    pub admin_token: Option<String>,
    pub template: TemplateSettings,
    pub email: EmailSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 8000,
            ws_port: 8001,
            database_url: "sqlite://portfolio.db".to_string(),
            migrations_dir: None,
            static_dir: "static".to_string(),
            admin_token: None,
            template: TemplateSettings::default(),
            email: EmailSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from `path` if it exists, then apply `PORTFOLIO_*`
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            log::info!("Loading settings from {}", path.display());
            Self::from_toml(&std::fs::read_to_string(path)?)?
        } else {
            log::info!("No settings file at {}, using defaults", path.display());
            Settings::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply overrides from a key lookup, normally the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PORTFOLIO_HOST") {
            self.host = v;
        }
        if let Some(port) = lookup("PORTFOLIO_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(v) = lookup("PORTFOLIO_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("PORTFOLIO_ADMIN_TOKEN") {
            self.admin_token = Some(v).filter(|t| !t.is_empty());
        }
        if let Some(v) = lookup("PORTFOLIO_DEBUG") {
            self.debug = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = lookup("PORTFOLIO_EMAIL_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "console" => self.email.backend = EmailBackend::Console,
                "memory" => self.email.backend = EmailBackend::Memory,
                "smtp" => self.email.backend = EmailBackend::Smtp,
                other => log::warn!("Ignoring unknown PORTFOLIO_EMAIL_BACKEND `{}`", other),
            }
        }
        if let Some(v) = lookup("PORTFOLIO_EMAIL_HOST") {
            self.email.host = v;
        }
        if let Some(v) = lookup("PORTFOLIO_EMAIL_PASSWORD") {
            self.email.password = Some(v);
        }
    }

    /// URL of the live-reload socket, only when running in debug mode.
    pub fn livereload_url(&self) -> Option<String> {
        self.debug
            .then(|| format!("ws://{}:{}/ws/reload", self.host, self.ws_port))
    }
}
