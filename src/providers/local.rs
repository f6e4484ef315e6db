//! Filesystem-backed provider.
//!
//! Objects live at `root/{bucket}/{key}` and are served back under
//! `base_url/{bucket}/{key}`. Writes go through a temp file that is fsynced
//! and renamed into place, so a crashed upload never leaves a partial object
//! at the final key.

use super::{Provider, ProviderResult};
use crate::{
    errors::ProviderError,
    models::{ActionContext, UploadedFile},
};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone, Debug)]
pub struct LocalProvider {
    root: PathBuf,
    bucket: String,
    base_url: String,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>, base_url: impl Into<String>) -> ProviderResult<Self> {
        let bucket = bucket.into();
        ensure_bucket_name_safe(&bucket)?;
        Ok(Self {
            root: root.into(),
            bucket,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_root(bucket).join(key)
    }

    /// Open a stored object for streaming out.
    pub async fn open(&self, bucket: &str, key: &str) -> ProviderResult<File> {
        ensure_bucket_name_safe(bucket)?;
        ensure_key_safe(key)?;
        Ok(File::open(self.object_path(bucket, key)).await?)
    }

    /// Remove empty directories from `start` upwards, stopping below `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, file: &UploadedFile, key: &str, ctx: &ActionContext) -> ProviderResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(&self.bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ProviderError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(err) = write_synced(&tmp_path, &file.content).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        debug!(
            request_id = %ctx.request_id,
            bucket = %self.bucket,
            key,
            size = file.size,
            "stored object"
        );
        Ok(())
    }

    async fn delete(&self, key: &str, bucket: &str, ctx: &ActionContext) -> ProviderResult<()> {
        ensure_bucket_name_safe(bucket)?;
        ensure_key_safe(key)?;
        let file_path = self.object_path(bucket, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!(request_id = %ctx.request_id, "removed {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(request_id = %ctx.request_id, "{} already missing", file_path.display());
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root(bucket)).await;
        }
        Ok(())
    }

    async fn path(&self, key: &str, bucket: &str, _ctx: &ActionContext) -> ProviderResult<String> {
        ensure_key_safe(key)?;
        Ok(format!("{}/{}/{}", self.base_url, bucket, key))
    }
}

async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Reject keys that could escape the bucket directory.
fn ensure_key_safe(key: &str) -> ProviderResult<()> {
    let unsafe_key = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
    if unsafe_key {
        return Err(ProviderError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Lowercase letters, digits, dots and hyphens; 3–63 characters; must start
/// and end alphanumeric.
fn ensure_bucket_name_safe(name: &str) -> ProviderResult<()> {
    let len_ok = (BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len());
    let chars_ok = name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'));
    let edges_ok = name
        .chars()
        .next()
        .zip(name.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());
    if !(len_ok && chars_ok && edges_ok) || name.contains("..") {
        return Err(ProviderError::Rejected(format!("invalid bucket name `{name}`")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(dir: &Path) -> LocalProvider {
        LocalProvider::new(dir, "uploads", "http://localhost:3000/files/").unwrap()
    }

    #[tokio::test]
    async fn upload_then_delete_prunes_directories() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let ctx = ActionContext::default();
        let file = UploadedFile::new("a.txt", Some("text/plain".into()), b"hello".to_vec());

        provider.upload(&file, "r1/a.txt", &ctx).await.unwrap();
        let stored = dir.path().join("uploads/r1/a.txt");
        assert_eq!(fs::read(&stored).await.unwrap(), b"hello");

        provider.delete("r1/a.txt", "uploads", &ctx).await.unwrap();
        assert!(!stored.exists());
        assert!(!dir.path().join("uploads/r1").exists());
    }

    #[tokio::test]
    async fn upload_overwrites_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let ctx = ActionContext::default();

        let first = UploadedFile::new("a.txt", None, b"one".to_vec());
        let second = UploadedFile::new("a.txt", None, b"two".to_vec());
        provider.upload(&first, "r1/a.txt", &ctx).await.unwrap();
        provider.upload(&second, "r1/a.txt", &ctx).await.unwrap();

        let stored = fs::read(dir.path().join("uploads/r1/a.txt")).await.unwrap();
        assert_eq!(stored, b"two");
    }

    #[tokio::test]
    async fn delete_of_missing_object_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        provider
            .delete("nothing/here.bin", "uploads", &ActionContext::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let ctx = ActionContext::default();
        let file = UploadedFile::new("x", None, b"x".to_vec());

        for key in ["", "/etc/passwd", "../x", "a/../../x", "a//b", "a\\b"] {
            assert!(matches!(
                provider.upload(&file, key, &ctx).await,
                Err(ProviderError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn path_joins_base_url_bucket_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(dir.path());
        let path = provider
            .path("r1/a.png", "uploads", &ActionContext::default())
            .await
            .unwrap();
        assert_eq!(path, "http://localhost:3000/files/uploads/r1/a.png");
    }

    #[test]
    fn bucket_names_are_validated() {
        assert!(ensure_bucket_name_safe("uploads").is_ok());
        assert!(ensure_bucket_name_safe("my.bucket-1").is_ok());
        assert!(ensure_bucket_name_safe("ab").is_err());
        assert!(ensure_bucket_name_safe("Uploads").is_err());
        assert!(ensure_bucket_name_safe("-uploads").is_err());
        assert!(ensure_bucket_name_safe("a..b").is_err());
    }
}
