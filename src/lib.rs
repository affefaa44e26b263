//! Personal portfolio website: a SQLite content store, server-rendered pages,
//! contact and appointment forms with mail notifications, and a token-guarded
//! admin console.

pub mod admin;
pub mod app;
pub mod error;
pub mod mail;
pub mod models;
pub mod orm;
pub mod router;
pub mod settings;
pub mod store;
pub mod submissions;
pub mod template;
pub mod views;

pub use error::{PortfolioError, Result};
pub use router::{AppState, Router};
pub use settings::Settings;
