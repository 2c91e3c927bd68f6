use std::path::Path;
use std::time::Duration;

use notebox_shared::error::NoteError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::debug;

use crate::migration::Migrator;

const SLOW_QUERY: Duration = Duration::from_millis(500);

/// Open the database and bring the schema up to date
///
/// `None` opens a private in-memory database, which only lives as long as its single connection.
pub async fn start_db(db_path: Option<&Path>) -> Result<DatabaseConnection, NoteError> {
    let mut options = match db_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    NoteError::Configuration(format!(
                        "Failed to create database directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
            ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()))
        }
        None => {
            let mut options = ConnectOptions::new("sqlite::memory:");
            options.max_connections(1).min_connections(1);
            options
        }
    };
    options
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Trace)
        .sqlx_slow_statements_logging_settings(log::LevelFilter::Warn, SLOW_QUERY);

    debug!("Opening Database: {}", options.get_url());
    let conn = Database::connect(options).await?;

    Migrator::up(&conn, None).await?;
    debug!("Database schema is up to date");

    Ok(conn)
}
