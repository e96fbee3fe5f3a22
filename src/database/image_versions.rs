//! Image-version queries
//!
//! The unique index on (original_image_id, param_hash) is the authority for
//! "one version per parameter set": a unique violation on insert means a
//! racing request won, and the engine re-reads the winner instead of
//! failing. Version numbers are allocated inside the insert transaction so
//! they stay dense per original.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_datetime, parse_uuid, Database};
use crate::models::{ImageVersion, NewImageVersion};

const SELECT_COLUMNS: &str = "id, original_image_id, version_number, file_path,
     operation_params, param_hash, user_id, created_at";

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ImageVersion, sqlx::Error> {
    Ok(ImageVersion {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        original_image_id: parse_uuid(&row.get::<String, _>("original_image_id"))?,
        version_number: row.get("version_number"),
        file_path: row.get("file_path"),
        operation_params: row.get("operation_params"),
        param_hash: row.get("param_hash"),
        user_id: row
            .get::<Option<String>, _>("user_id")
            .map(|s| parse_uuid(&s))
            .transpose()?,
        created_at: parse_datetime(&row.get::<String, _>("created_at"))?,
    })
}

impl Database {
    /// The version produced by this exact parameter set, if any
    pub async fn find_version_by_params(
        &self,
        original_image_id: Uuid,
        param_hash: &str,
    ) -> Result<Option<ImageVersion>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM image_versions WHERE original_image_id = ? AND param_hash = ?",
            SELECT_COLUMNS
        ))
        .bind(original_image_id.to_string())
        .bind(param_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(version_from_row).transpose()
    }

    pub async fn get_version_by_number(
        &self,
        original_image_id: Uuid,
        version_number: i64,
    ) -> Result<Option<ImageVersion>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM image_versions WHERE original_image_id = ? AND version_number = ?",
            SELECT_COLUMNS
        ))
        .bind(original_image_id.to_string())
        .bind(version_number)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(version_from_row).transpose()
    }

    /// Every version of one original, in creation order
    pub async fn find_versions_for_original(
        &self,
        original_image_id: Uuid,
    ) -> Result<Vec<ImageVersion>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM image_versions WHERE original_image_id = ? ORDER BY version_number",
            SELECT_COLUMNS
        ))
        .bind(original_image_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(version_from_row).collect()
    }

    /// Insert a new version, allocating the next version number and
    /// incrementing the parent counter in one transaction
    ///
    /// Returns `Ok(None)` when the unique constraint on
    /// (original_image_id, param_hash) fired: a concurrent identical request
    /// already created the version, and the caller must re-read it.
    pub async fn insert_version(
        &self,
        new: NewImageVersion,
    ) -> Result<Option<ImageVersion>, sqlx::Error> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let original_id = new.original_image_id.to_string();

        let mut tx = self.pool.begin().await?;

        // 1 + max(existing), dense per original; safe under SQLite's
        // single-writer transaction model
        let version_number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) + 1
             FROM image_versions WHERE original_image_id = ?",
        )
        .bind(&original_id)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO image_versions
             (id, original_image_id, version_number, file_path,
              operation_params, param_hash, user_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&original_id)
        .bind(version_number)
        .bind(&new.file_path)
        .bind(&new.operation_params)
        .bind(&new.param_hash)
        .bind(new.user_id.map(|u| u.to_string()))
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        sqlx::query("UPDATE original_images SET version_count = version_count + 1 WHERE id = ?")
            .bind(&original_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(ImageVersion {
            id,
            original_image_id: new.original_image_id,
            version_number,
            file_path: new.file_path,
            operation_params: new.operation_params,
            param_hash: new.param_hash,
            user_id: new.user_id,
            created_at,
        }))
    }

    /// Delete a version and decrement the parent counter transactionally
    ///
    /// Returns the deleted record so callers can drop its volatile mirrors.
    pub async fn delete_version(
        &self,
        version_id: Uuid,
    ) -> Result<Option<ImageVersion>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM image_versions WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(version_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(version) = row.as_ref().map(version_from_row).transpose()? else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM image_versions WHERE id = ?")
            .bind(version_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE original_images SET version_count = version_count - 1
             WHERE id = ? AND version_count > 0",
        )
        .bind(version.original_image_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(version))
    }

    /// Recent versions across all originals, newest first
    pub async fn list_recent_versions(
        &self,
        limit: i64,
    ) -> Result<Vec<ImageVersion>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM image_versions ORDER BY created_at DESC, version_number DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(version_from_row).collect()
    }
}
