//! Wiring: connects services into an [`AppState`] and registers every route.

use std::sync::Arc;

use crate::error::Result;
use crate::mail::{self, Mailer};
use crate::models;
use crate::orm::{self, Db};
use crate::route;
use crate::router::{self, AppState, Router};
use crate::settings::Settings;
use crate::template;
use crate::{admin, submissions, views};

impl AppState {
    pub fn new(db: Arc<Db>, settings: Settings, mailer: Arc<dyn Mailer>) -> Self {
        AppState {
            db,
            settings,
            mailer,
        }
    }
}

/// Open the database and bring its schema up to date.
pub async fn open_database(settings: &Settings) -> Result<Arc<Db>> {
    let db = Arc::new(Db::connect(&settings.database_url).await?);
    models::migrate(db.clone()).await?;
    if let Some(dir) = &settings.migrations_dir {
        let applied = orm::apply_migration_files(db.clone(), dir).await?;
        if applied > 0 {
            log::info!("Applied {} migration file(s) from {}", applied, dir);
        }
    }
    Ok(db)
}

/// Build the shared state from settings: database, schema and mail backend.
pub async fn bootstrap(settings: Settings) -> Result<AppState> {
    template::set_display_logs(settings.template.debug);
    let db = open_database(&settings).await?;
    let mailer = mail::build_mailer(&settings.email)?;
    Ok(AppState::new(db, settings, mailer))
}

/// Register pages, form endpoints, static assets and the admin console.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new();
    router.add_middleware(router::request_timer());
    router.add_middleware(router::authenticate(state.settings.admin_token.clone()));
    router.add_post_middleware(router::access_log());

    route!(router,
        Get "/" => { views::home },
        Get "/projects/" => { views::projects_list },
        Get "/books/" => { views::books_list },
        Get "/papers/" => { views::papers_list },
        Get "/blog/" => { views::blog_list },
        Get "/appointments/" => { views::appointments },
        Post "/appointment-submit/" => { submissions::appointment_submit },
        Post "/contact/" => { submissions::contact_submit },
        Get "/static/:dir/:file" => { views::static_file },
    );

    route!(router,
        Get "/admin/" => { admin::index, router::require_admin() },
        Get "/admin/:model/" => { admin::list_view, router::require_admin() },
        Post "/admin/:model/" => { admin::create, router::require_admin() },
        Get "/admin/:model/:id/" => { admin::detail, router::require_admin() },
        Post "/admin/:model/:id/" => { admin::update, router::require_admin() },
        Post "/admin/:model/:id/delete/" => { admin::delete, router::require_admin() },
    );

    router.set_app_state(state);
    router
}
