//! Minimal async ORM for the portfolio (sqlite + sqlx)
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! db.execute("CREATE TABLE ...").await?;
//! db.fetch_all_with::<Row>("SELECT ... WHERE id = ?", &[SqlValue::Integer(1)]).await?
pub use futures::future::BoxFuture;
use log::{debug, info};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Arguments, Executor, Row, SqlitePool};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use walkdir::WalkDir;

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// A dynamically typed value bound to a `?` placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Integer(i)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

fn to_arguments(values: &[SqlValue]) -> Result<SqliteArguments<'static>, sqlx::Error> {
    let mut args = SqliteArguments::default();
    for value in values {
        let added = match value {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Integer(i) => args.add(*i),
            SqlValue::Text(s) => args.add(s.clone()),
            SqlValue::Bool(b) => args.add(*b),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

pub struct Migration(pub fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>);

impl std::ops::Deref for Migration {
    type Target = fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

inventory::collect!(Migration);

/// Register a `Model` implementation for `auto_migrate`.
#[macro_export]
macro_rules! register_model {
    ($model:ty) => {
        const _: () = {
            fn migrate(
                db: ::std::sync::Arc<$crate::orm::Db>,
            ) -> $crate::orm::BoxFuture<'static, ::std::result::Result<(), ::sqlx::Error>> {
                ::std::boxed::Box::pin(<$model as $crate::orm::Model>::migrate(db))
            }
            ::inventory::submit! { $crate::orm::Migration(migrate) }
        };
    };
}

const SCHEMA_TABLE: &str = "__portfolio_schema";
const MIGRATION_FILES_TABLE: &str = "__portfolio_migrations";

#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;

    /// Column name and SQL type/constraint pairs, excluding `id`.
    fn columns() -> Vec<(String, String)>;

    /// Table-level constraints such as `UNIQUE (a, b)`.
    fn table_constraints() -> Vec<String> {
        Vec::new()
    }

    fn create_table_sql() -> String {
        let mut parts = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        parts.extend(
            Self::columns()
                .into_iter()
                .map(|(name, sqltype)| format!("{} {}", name, sqltype)),
        );
        parts.extend(Self::table_constraints());
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            Self::table_name(),
            parts.join(", ")
        )
    }

    async fn migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        db.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT UNIQUE NOT NULL,
                schema_sql TEXT NOT NULL,
                hash TEXT NOT NULL,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            SCHEMA_TABLE
        ))
        .await?;

        let row = db
            .fetch_all_with::<(String,)>(
                &format!("SELECT hash FROM {} WHERE table_name = ?", SCHEMA_TABLE),
                &[table_name.into()],
            )
            .await?;

        if row.is_empty() {
            db.execute(&create_sql).await?;
            db.execute_with(
                &format!(
                    "INSERT INTO {} (table_name, schema_sql, hash) VALUES (?, ?, ?)",
                    SCHEMA_TABLE
                ),
                &[
                    table_name.into(),
                    create_sql.as_str().into(),
                    schema_hash.as_str().into(),
                ],
            )
            .await?;
            info!(
                "Migrated `{}` (table created, initial schema applied).",
                table_name
            );
            return Ok(());
        }

        if row[0].0 == schema_hash {
            debug!("Schema of `{}` unchanged.", table_name);
            return Ok(());
        }

        // Get existing cols from DB
        let pragma_sql = format!("PRAGMA table_info({})", table_name);
        let cols: Vec<String> = sqlx::query(&pragma_sql)
            .fetch_all(&db.pool)
            .await?
            .into_iter()
            .map(|row: SqliteRow| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (name, sqltype) in Self::columns() {
            if !cols.contains(&name) {
                let statement = format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table_name, name, sqltype
                );
                db.execute(&statement).await?;
                added.push((name, sqltype));
            }
        }

        if added.is_empty() {
            info!("No column changes detected for `{}`.", table_name);
        } else {
            info!(
                "Schema changes detected for `{}`, the following columns were added:",
                table_name
            );
            for (name, sqltype) in &added {
                info!("  - {} {}", name, sqltype);
            }
        }
        db.execute_with(
            &format!(
                "UPDATE {} SET schema_sql = ?, hash = ?, applied_at = CURRENT_TIMESTAMP \
                 WHERE table_name = ?",
                SCHEMA_TABLE
            ),
            &[
                create_sql.as_str().into(),
                schema_hash.as_str().into(),
                table_name.into(),
            ],
        )
        .await?;
        Ok(())
    }
}

// Helper function to hash a SQL string
fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Db {
    /// Connect (or create) a SQLite database at the given URI
    pub async fn connect(uri: &str) -> Result<Self, sqlx::Error> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new();
        if uri.contains(":memory:") {
            // Every pooled connection would otherwise see its own empty database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    /// Execute an arbitrary SQL statement, e.g. DDL, INSERT, UPDATE.
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        if let Err(e) = &result {
            log::error!("SQL execution failed: {}", e);
        }
        result.map(|_| ())
    }

    /// Execute a statement with bound values, returning the affected row count.
    pub async fn execute_with(&self, sql: &str, values: &[SqlValue]) -> Result<u64, sqlx::Error> {
        debug!("Executing SQL: {} with {} values", sql, values.len());
        let result = sqlx::query_with(sql, to_arguments(values)?)
            .execute(&self.pool)
            .await;
        match &result {
            Ok(done) => debug!("{} rows affected", done.rows_affected()),
            Err(e) => log::error!("SQL execution failed: {}", e),
        }
        result.map(|done| done.rows_affected())
    }

    /// Run an INSERT with bound values and return the new row id.
    pub async fn insert(&self, sql: &str, values: &[SqlValue]) -> Result<i64, sqlx::Error> {
        debug!("Inserting with SQL: {}", sql);
        let result = sqlx::query_with(sql, to_arguments(values)?)
            .execute(&self.pool)
            .await;
        match &result {
            Ok(done) => info!("Inserted row {}", done.last_insert_rowid()),
            Err(e) => log::error!("Insert failed: {}", e),
        }
        result.map(|done| done.last_insert_rowid())
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> Result<Vec<T>, sqlx::Error> {
        self.fetch_all_with(sql, &[]).await
    }

    /// Fetch all rows of a query with bound values.
    pub async fn fetch_all_with<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<Vec<T>, sqlx::Error> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as_with(sql, to_arguments(values)?)
            .fetch_all(&self.pool)
            .await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows successfully", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result
    }

    /// Fetch at most one row of a query with bound values.
    pub async fn fetch_optional_with<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
        values: &[SqlValue],
    ) -> Result<Option<T>, sqlx::Error> {
        debug!("Fetching one row with SQL: {}", sql);
        let result = sqlx::query_as_with(sql, to_arguments(values)?)
            .fetch_optional(&self.pool)
            .await;
        if let Err(e) = &result {
            log::error!("Row fetch failed: {}", e);
        }
        result
    }
}

/// Migrate all registered models using the inventory pattern.
pub async fn auto_migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
    info!("Starting auto migration of all registered models...");
    let mut total = 0;
    for m in inventory::iter::<Migration> {
        total += 1;
        if let Err(e) = m(db.clone()).await {
            log::error!("Auto-migration failed for a model: {}", e);
            return Err(e);
        }
    }
    info!("Auto migration completed for {} models.", total);
    Ok(())
}

/// Applies file-based migrations located in the `migrations_dir` directory.
/// Each migration file should be a *.sql file.
/// Already-applied migrations are skipped based on filename tracking.
pub async fn apply_migration_files(db: Arc<Db>, migrations_dir: &str) -> Result<usize, sqlx::Error> {
    db.execute(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT UNIQUE NOT NULL,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        MIGRATION_FILES_TABLE
    ))
    .await?;

    // List .sql files in migrations directory, sorted by filename
    let mut files: Vec<_> = WalkDir::new(migrations_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|f| f.file_type().is_file())
        .filter(|f| f.path().extension().map(|e| e == "sql").unwrap_or(false))
        .collect();
    files.sort_by_key(|f| f.file_name().to_os_string());

    let mut applied_now = 0;
    for entry in files {
        let filename = entry.file_name().to_string_lossy().to_string();
        let applied: Vec<(String,)> = db
            .fetch_all_with(
                &format!(
                    "SELECT filename FROM {} WHERE filename = ?",
                    MIGRATION_FILES_TABLE
                ),
                &[filename.as_str().into()],
            )
            .await?;
        if !applied.is_empty() {
            debug!("Migration `{}` already applied.", filename);
            continue;
        }

        let sql = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        info!("Applying migration file: {}", filename);
        db.execute(&sql).await?;
        db.execute_with(
            &format!("INSERT INTO {} (filename) VALUES (?)", MIGRATION_FILES_TABLE),
            &[filename.as_str().into()],
        )
        .await?;
        info!("Migration `{}` applied.", filename);
        applied_now += 1;
    }

    Ok(applied_now)
}
