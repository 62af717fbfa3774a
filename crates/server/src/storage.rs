use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

use crate::error::{AppError, AppResult};

/// A file written to durable storage.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub file_name: String,
    pub url: String,
    pub size: u64,
}

/// Disk-backed store for reassembled media, laid out as `{base}/{id}/{file_name}`.
#[derive(Debug, Clone)]
pub struct FileStore {
    base: PathBuf,
    max_size: u64,
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid file name pattern"))
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}

fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FileStore {
    pub fn new(base: impl AsRef<Path>, max_size: u64) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            max_size,
        }
    }

    /// Write the whole payload under a fresh id. The file only appears under its
    /// final name once fully written.
    pub async fn store(&self, file_name: &str, data: &[u8]) -> AppResult<StoredFile> {
        if data.is_empty() {
            return Err(AppError::Transfer("empty payload".into()));
        }
        if data.len() as u64 > self.max_size {
            return Err(AppError::PayloadTooLarge);
        }

        let id = nanoid::nanoid!();
        let name = sanitize_file_name(file_name);
        let dir = self.base.join(&id);
        fs::create_dir_all(&dir).await?;

        let partial = dir.join(format!(".{}.part", name));
        let target = dir.join(&name);
        if let Err(e) = fs::write(&partial, data).await {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(e.into());
        }
        fs::rename(&partial, &target).await?;

        tracing::debug!(id = %id, size = data.len(), "stored file");
        Ok(StoredFile {
            url: format!("/api/files/{}/{}", id, urlencoding::encode(&name)),
            id,
            file_name: name,
            size: data.len() as u64,
        })
    }

    /// Resolve a stored file, rejecting anything that could escape the base directory.
    pub fn path_of(&self, id: &str, file_name: &str) -> AppResult<PathBuf> {
        if !valid_id(id) || sanitize_file_name(file_name) != file_name {
            return Err(AppError::NotFound("File"));
        }
        Ok(self.base.join(id).join(file_name))
    }
}

/// Best-effort content type from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
