//! Original-image queries
//!
//! One record per storage path; immutable after insert except for the
//! version counter (maintained inside version transactions) and last-access
//! bookkeeping.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid, Database};
use crate::models::{NewOriginalImage, OriginalImage, SourceKind};

const SELECT_COLUMNS: &str = "id, file_name, original_file_name, file_path, content_hash,
     source_kind, source_url, user_id, version_count, created_at, last_accessed_at";

fn original_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OriginalImage, sqlx::Error> {
    let source_kind_str: String = row.get("source_kind");
    let source_kind = SourceKind::parse(&source_kind_str).ok_or_else(|| {
        sqlx::Error::Decode(format!("Unknown source kind: {}", source_kind_str).into())
    })?;

    Ok(OriginalImage {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        file_name: row.get("file_name"),
        original_file_name: row.get("original_file_name"),
        file_path: row.get("file_path"),
        content_hash: row.get("content_hash"),
        source_kind,
        source_url: row.get("source_url"),
        user_id: row
            .get::<Option<String>, _>("user_id")
            .map(|s| parse_uuid(&s))
            .transpose()?,
        version_count: row.get("version_count"),
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
        last_accessed_at: row
            .get::<Option<String>, _>("last_accessed_at")
            .map(|s| parse_datetime(&s))
            .transpose()?,
    })
}

impl Database {
    /// Register an ingested image; fatal on any store error because the
    /// durable record is the source of truth
    pub async fn insert_original_image(
        &self,
        new: NewOriginalImage,
    ) -> Result<OriginalImage, sqlx::Error> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO original_images
             (id, file_name, original_file_name, file_path, content_hash,
              source_kind, source_url, user_id, version_count, created_at, last_accessed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, NULL)",
        )
        .bind(id.to_string())
        .bind(&new.file_name)
        .bind(&new.original_file_name)
        .bind(&new.file_path)
        .bind(&new.content_hash)
        .bind(new.source_kind.as_str())
        .bind(&new.source_url)
        .bind(new.user_id.map(|u| u.to_string()))
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(OriginalImage {
            id,
            file_name: new.file_name,
            original_file_name: new.original_file_name,
            file_path: new.file_path,
            content_hash: new.content_hash,
            source_kind: new.source_kind,
            source_url: new.source_url,
            user_id: new.user_id,
            version_count: 0,
            created_at,
            last_accessed_at: None,
        })
    }

    pub async fn get_original_image(
        &self,
        id: Uuid,
    ) -> Result<Option<OriginalImage>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM original_images WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(original_from_row).transpose()
    }

    /// Look up by storage path, the record's natural identity
    pub async fn get_original_image_by_path(
        &self,
        file_path: &str,
    ) -> Result<Option<OriginalImage>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM original_images WHERE file_path = ?",
            SELECT_COLUMNS
        ))
        .bind(file_path)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(original_from_row).transpose()
    }

    /// All originals whose stored bytes hash to the given value
    pub async fn find_by_content_hash(
        &self,
        content_hash: &str,
    ) -> Result<Vec<OriginalImage>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM original_images WHERE content_hash = ? ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(original_from_row).collect()
    }

    /// Most recently ingested originals, newest first
    pub async fn list_recent_originals(
        &self,
        limit: i64,
    ) -> Result<Vec<OriginalImage>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM original_images ORDER BY created_at DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(original_from_row).collect()
    }

    /// Last-access bookkeeping; callers treat failures as non-fatal
    pub async fn touch_last_accessed(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE original_images SET last_accessed_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
