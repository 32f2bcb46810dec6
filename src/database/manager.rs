use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the data layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Duplicate value: {0}")]
    Conflict(String),

    #[error("Referenced record does not exist: {0}")]
    InvalidReference(String),

    #[error("Invalid value for {column}: {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let constraint = db.constraint().map(str::to_string);
            if let Some(mapped) = from_sqlstate(db.code().as_deref(), constraint, db.message()) {
                return mapped;
            }
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Unavailable(err.to_string())
            }
            other => DatabaseError::Sqlx(other),
        }
    }
}

/// Client-caused Postgres errors, by SQLSTATE. `None` for everything else.
fn from_sqlstate(
    code: Option<&str>,
    constraint: Option<String>,
    message: &str,
) -> Option<DatabaseError> {
    let message = message.to_string();
    match code? {
        // unique_violation
        "23505" => Some(DatabaseError::Conflict(
            constraint.map(|c| format!("{} already exists", c)).unwrap_or(message),
        )),
        // foreign_key_violation
        "23503" => Some(DatabaseError::InvalidReference(constraint.unwrap_or(message))),
        // not_null_violation, check_violation
        "23502" | "23514" => Some(DatabaseError::InvalidInput(message)),
        // invalid_text_representation, invalid_datetime_format,
        // numeric_value_out_of_range, datetime_field_overflow
        "22P02" | "22007" | "22003" | "22008" => Some(DatabaseError::InvalidInput(message)),
        _ => None,
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
}

/// Connect eagerly, failing if the database cannot be reached.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    validate_url(&config.url)?;
    let pool = pool_options(config).connect(&config.url).await?;
    info!("Connected database pool (max {} connections)", config.max_connections);
    Ok(pool)
}

/// Build a pool that opens connections on first use, so the server can start
/// (and report a degraded /health) while the database is down.
pub fn connect_lazy(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    validate_url(&config.url)?;
    let pool = pool_options(config).connect_lazy(&config.url)?;
    info!("Created lazy database pool (max {} connections)", config.max_connections);
    Ok(pool)
}

/// Apply the bundled migrations in `migrations/`.
pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

fn validate_url(raw: &str) -> Result<(), DatabaseError> {
    let url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(()),
        _ => Err(DatabaseError::InvalidDatabaseUrl),
    }
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
