//! Artifact storage
//!
//! Two directories: originals (ingested uploads and URL downloads) and
//! processed (transformation artifacts). Uploaded originals get uuid-derived
//! names; URL-sourced originals get a name derived from the URL hash so the
//! same URL always lands on the same path. Artifacts are named from the
//! original's stem plus a short parameter-hash suffix.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tokio::fs;
use uuid::Uuid;

use crate::errors::AppError;

const MAX_DOWNLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ImageStore {
    originals_dir: PathBuf,
    processed_dir: PathBuf,
}

impl ImageStore {
    pub fn new(originals_dir: PathBuf, processed_dir: PathBuf) -> Self {
        Self {
            originals_dir,
            processed_dir,
        }
    }

    pub async fn ensure_storage_dirs(&self) -> Result<(), std::io::Error> {
        if !self.originals_dir.exists() {
            fs::create_dir_all(&self.originals_dir).await?;
        }
        if !self.processed_dir.exists() {
            fs::create_dir_all(&self.processed_dir).await?;
        }
        Ok(())
    }

    /// Store uploaded bytes under a fresh uuid-derived name
    ///
    /// Returns (file_name, file_path); the path is the record identity the
    /// durable store keys on.
    pub async fn save_original(
        &self,
        data: &[u8],
        original_filename: &str,
    ) -> Result<(String, String), AppError> {
        self.ensure_storage_dirs().await?;

        let extension = extension_for(original_filename, data);
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);
        let file_path = self.originals_dir.join(&file_name);
        fs::write(&file_path, data).await?;

        Ok((file_name, file_path.to_string_lossy().into_owned()))
    }

    /// Store URL-downloaded bytes under a URL-hash-derived name
    ///
    /// The same URL maps to the same path, so re-ingesting a URL finds the
    /// existing durable record by path instead of duplicating the original.
    pub async fn save_url_original(
        &self,
        data: &[u8],
        source_url: &str,
    ) -> Result<(String, String), AppError> {
        self.ensure_storage_dirs().await?;

        let url_hash = format!("{:x}", md5::compute(source_url.as_bytes()));
        let extension = detected_extension(data).unwrap_or("png");
        let file_name = format!("url_{}.{}", url_hash, extension);
        let file_path = self.originals_dir.join(&file_name);

        if !file_path.exists() {
            fs::write(&file_path, data).await?;
        }

        Ok((file_name, file_path.to_string_lossy().into_owned()))
    }

    /// Store a computed artifact as `{stem}_{hash8}.png` under processed/
    pub async fn save_artifact(
        &self,
        data: &[u8],
        original_file_name: &str,
        param_hash: &str,
    ) -> Result<String, AppError> {
        self.ensure_storage_dirs().await?;

        let stem = Path::new(original_file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| original_file_name.to_string());
        let suffix = &param_hash[..param_hash.len().min(8)];
        let file_path = self.processed_dir.join(format!("{}_{}.png", stem, suffix));
        fs::write(&file_path, data).await?;

        Ok(file_path.to_string_lossy().into_owned())
    }

    pub async fn read(&self, file_path: &str) -> Result<Vec<u8>, std::io::Error> {
        fs::read(file_path).await
    }

    pub async fn delete(&self, file_path: &str) -> Result<(), std::io::Error> {
        let path = Path::new(file_path);
        if path.exists() {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    /// Fetch image bytes from a URL with content-type and size checks
    pub async fn download_image(url: &str) -> Result<Vec<u8>, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("imgcache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(AppError::processing(format!(
                "Failed to download image: HTTP {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.starts_with("image/") {
            return Err(AppError::validation("url", "does not point to an image"));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_DOWNLOAD_BYTES {
            return Err(AppError::validation("url", "image too large (max 10MB)"));
        }

        Ok(bytes.to_vec())
    }
}

fn detected_extension(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}

/// Extension for a stored original: trust the client's extension when it is
/// a known image type, otherwise sniff the bytes
fn extension_for(original_filename: &str, data: &[u8]) -> &'static str {
    match Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "png",
        Some("jpg") | Some("jpeg") => "jpg",
        Some("gif") => "gif",
        Some("webp") => "webp",
        _ => detected_extension(data).unwrap_or("png"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_original_uses_fresh_names_per_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("orig"), dir.path().join("proc"));

        let (name_a, path_a) = store.save_original(b"bytes-a", "photo.png").await.unwrap();
        let (name_b, path_b) = store.save_original(b"bytes-b", "photo.png").await.unwrap();

        assert_ne!(name_a, name_b);
        assert_ne!(path_a, path_b);
        assert!(name_a.ends_with(".png"));
        assert_eq!(store.read(&path_a).await.unwrap(), b"bytes-a");
    }

    #[tokio::test]
    async fn save_url_original_is_stable_per_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("orig"), dir.path().join("proc"));

        let (name_a, path_a) = store
            .save_url_original(b"\x89PNG\r\n\x1a\nrest", "https://example.com/cat.png")
            .await
            .unwrap();
        let (name_b, path_b) = store
            .save_url_original(b"\x89PNG\r\n\x1a\nrest", "https://example.com/cat.png")
            .await
            .unwrap();

        assert_eq!(name_a, name_b);
        assert_eq!(path_a, path_b);
    }

    #[tokio::test]
    async fn artifact_name_carries_stem_and_hash_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("orig"), dir.path().join("proc"));

        let path = store
            .save_artifact(b"pixels", "abc123.png", "deadbeefcafef00d")
            .await
            .unwrap();
        assert!(path.ends_with("abc123_deadbeef.png"), "got {}", path);
    }
}
