//! Durable metadata store
//!
//! SQLite via sqlx; source of truth for original images and their versions.
//! Query methods return `sqlx::Error` so service callers convert into the
//! application error hierarchy; connection setup and migrations use `anyhow`
//! as infrastructure glue.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite};
use uuid::Uuid;

use crate::config::DatabaseConfig;

pub mod image_versions;
pub mod original_images;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create database if it doesn't exist (for SQLite)
        if !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }
}

// Helper to parse datetime from either RFC3339 or SQLite format
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(sqlx::Error::Decode(
        format!("Failed to parse datetime: {}", s).into(),
    ))
}

fn parse_uuid(s: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(s).map_err(|e| sqlx::Error::Decode(format!("Invalid uuid {}: {}", s, e).into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datetime_accepts_both_stored_formats() {
        assert!(parse_datetime("2026-08-29T10:00:00+00:00").is_ok());
        assert!(parse_datetime("2026-08-29 10:00:00").is_ok());
        assert!(parse_datetime("yesterday-ish").is_err());
    }
}
