/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob `{0}` does not exist")]
    NotFound(String),
    #[error("invalid blob key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStorage: Debug + Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Stores the bytes under a freshly generated key and returns it.
    async fn put(&self, data: Vec<u8>) -> Result<String, StorageError>;
    /// Stores the bytes under a caller chosen key, replacing any previous blob.
    async fn put_with_key(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, data: Vec<u8>) -> Result<String, StorageError> {
        let key = Uuid::new_v4().to_string();
        self.put_with_key(&key, data).await?;
        Ok(key)
    }

    async fn put_with_key(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(path, data).await?;
        debug!(key = %key, "Stored blob");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path(key)?).await?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn insert(&self, key: impl Into<String>, data: Vec<u8>) {
        self.blobs.insert(key.into(), data);
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(key)
            .map(|data| data.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, data: Vec<u8>) -> Result<String, StorageError> {
        let key = Uuid::new_v4().to_string();
        self.blobs.insert(key.clone(), data);
        Ok(key)
    }

    async fn put_with_key(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.blobs.insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(key))
    }
}
