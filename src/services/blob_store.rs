//! src/services/blob_store.rs
//!
//! LocalBlobStore: photo payloads on local disk, sharded beneath
//! `root/{shard}/{shard}/{uuid}{ext}`. Paths handed out are relative to the
//! root and are the only thing the rest of the service ever sees.

use crate::services::ports::{BlobError, BlobResult, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Longest extension carried over from the client filename.
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Base directory on disk where photo payloads are stored.
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keep a short, alphanumeric extension from the client filename.
    fn extension_of(filename: &str) -> String {
        match Path::new(filename).extension().and_then(|ext| ext.to_str()) {
            Some(ext)
                if !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LEN
                    && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                format!(".{}", ext.to_ascii_lowercase())
            }
            _ => String::new(),
        }
    }

    /// Two-level shard directories from MD5 of the blob name (00–ff each).
    fn shards(name: &str) -> (String, String) {
        let digest = md5::compute(name);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Resolve a storage path against the root, refusing anything that could
    /// land outside it.
    fn resolve(&self, storage_path: &str) -> BlobResult<PathBuf> {
        let relative = Path::new(storage_path);
        let escapes = storage_path.is_empty()
            || storage_path.contains('\\')
            || storage_path.contains('\0')
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(BlobError::PathEscape(storage_path.to_string()));
        }

        let full = self.root.join(relative);
        if !full.starts_with(&self.root) {
            return Err(BlobError::PathEscape(storage_path.to_string()));
        }
        Ok(full)
    }

    /// Remove empty shard directories up to (not including) the root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.root) && current != self.root {
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

/// Publish `tmp` as `target` with create-new semantics, then drop the temp
/// name whatever the outcome.
async fn link_into_place(tmp: &Path, target: &Path) -> BlobResult<()> {
    let linked = fs::hard_link(tmp, target).await;
    if let Err(err) = fs::remove_file(tmp).await {
        debug!("could not remove temp file {}: {}", tmp.display(), err);
    }
    match linked {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(BlobError::Io(
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("blob {} already exists", target.display()),
            ),
        )),
        Err(err) => Err(BlobError::Io(err)),
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Write to a temp file, fsync, then hard-link it under a fresh UUID
    /// name. Linking fails when the name is taken, so an existing payload is
    /// never replaced.
    async fn put(&self, filename: &str, bytes: Bytes) -> BlobResult<String> {
        let name = format!("{}{}", Uuid::new_v4(), Self::extension_of(filename));
        let (shard_a, shard_b) = Self::shards(&name);
        let storage_path = format!("{shard_a}/{shard_b}/{name}");
        let target = self.resolve(&storage_path)?;

        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| BlobError::PathEscape(storage_path.clone()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await?;

        let written = async {
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }

        link_into_place(&tmp_path, &target).await?;

        debug!(path = %storage_path, size = bytes.len(), "stored blob");
        Ok(storage_path)
    }

    async fn delete(&self, storage_path: &str) -> BlobResult<()> {
        let target = self.resolve(storage_path)?;
        match fs::remove_file(&target).await {
            Ok(_) => debug!("removed blob {}", target.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", target.display());
            }
            Err(err) => return Err(BlobError::Io(err)),
        }

        if let Some(parent) = target.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn exists(&self, storage_path: &str) -> BlobResult<bool> {
        let target = self.resolve(storage_path)?;
        Ok(fs::try_exists(&target).await?)
    }
}
