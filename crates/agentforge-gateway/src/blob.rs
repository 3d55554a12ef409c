// SPDX-License-Identifier: Apache-2.0
//! Minimal content-addressed blob store for uploaded datasets.
//!
//! A deployment without a real object store configured falls back to this
//! thin local-disk stand-in, mirroring how `agentforge-store`'s in-memory
//! backend stands in for the persistence port. Content is addressed by its
//! SHA-256 digest (same hashing convention as `agentforge_orchestrator::digest`),
//! so re-uploading identical bytes is a no-op write.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob I/O error: {0}")]
    Io(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` and returns an opaque location string the dataset
    /// handle carries forward; core never interprets it further.
    async fn put(&self, bytes: &[u8]) -> Result<String, BlobError>;
}

/// Writes blobs under `root/<sha256-hex>`, deduplicating identical uploads.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<String, BlobError> {
        let digest = hex::encode(Sha256::digest(bytes));
        let root = self.root.clone();
        let path = root.join(&digest);
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
            std::fs::create_dir_all(&root)?;
            if !path.exists() {
                std::fs::write(&path, &data)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| BlobError::Io(e.to_string()))?
        .map_err(|e| BlobError::Io(e.to_string()))?;
        Ok(format!("file://{}/{digest}", self.root.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_content_addressed_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let location = store.put(b"hello world").await.unwrap();
        assert!(location.contains(&hex::encode(Sha256::digest(b"hello world"))));
    }

    #[tokio::test]
    async fn identical_uploads_resolve_to_the_same_location() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let a = store.put(b"same bytes").await.unwrap();
        let b = store.put(b"same bytes").await.unwrap();
        assert_eq!(a, b);
    }
}
