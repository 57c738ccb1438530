//! Upload storage helpers.
//!
//! Uploaded files land under `<root>/storage/uploads` (assignments) and
//! `<root>/storage/rubrics`. Names are sanitised before they touch the
//! filesystem, bodies are copied in fixed-size chunks so large files never
//! sit in memory, and every stored file gets a hex SHA-256.
//!
//! A save either replaces the target completely or leaves it untouched: the
//! body goes to a temporary file next to the target, which is renamed over
//! it only once the copy finished.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::Settings;

/// Copy buffer size for uploads.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Name used when sanitising leaves nothing.
pub const FALLBACK_FILENAME: &str = "upload.bin";

/// Directory layout rooted at `storage_root`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.storage_root.clone())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("storage").join("uploads")
    }

    pub fn rubrics_dir(&self) -> PathBuf {
        self.root.join("storage").join("rubrics")
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("data").join("sources")
    }

    pub async fn ensure_uploads_dir(&self) -> io::Result<PathBuf> {
        ensure_dir(self.uploads_dir()).await
    }

    pub async fn ensure_rubrics_dir(&self) -> io::Result<PathBuf> {
        ensure_dir(self.rubrics_dir()).await
    }

    /// `path` relative to the root, or `path` unchanged if it lies outside.
    pub fn relative_to_root(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

async fn ensure_dir(dir: PathBuf) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Keep only `[A-Za-z0-9-_.() ]`, trimmed. Empty results become
/// [`FALLBACK_FILENAME`].
pub fn sanitize_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')' | ' '))
        .collect();
    let trimmed = kept.trim();
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension of `name`, if any.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Stream `reader` into `dest` in [`CHUNK_SIZE`] pieces. Returns bytes written.
///
/// An existing `dest` is replaced only when the whole body was copied. On
/// error the temporary file is removed and `dest` keeps its old contents.
pub async fn save_upload<R>(mut reader: R, dest: &Path) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let partial = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".part")
        .tempfile_in(dir)?;
    let mut file = tokio::fs::File::from_std(partial.reopen()?);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    partial.persist(dest).map_err(|e| e.error)?;
    Ok(written)
}

/// Hex SHA-256 of the file at `path`, read in [`CHUNK_SIZE`] pieces.
pub async fn compute_sha256(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
