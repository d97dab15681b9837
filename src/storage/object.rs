//! Object store backends
//!
//! `FsObjectStore` lays objects out as `<root>/<bucket>/<key>` and keeps
//! content type and storage class in a sidecar file under
//! `<root>/.meta/<bucket>/<key>.json`.

use crate::config::StorageClass;
use crate::storage::traits::{
    validate_object_key, ObjectInfo, ObjectStore, StorageError, StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const META_DIR: &str = ".meta";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    storage_class: String,
    last_modified: DateTime<Utc>,
}

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        validate_bucket(bucket)?;
        validate_object_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join(META_DIR)
            .join(bucket)
            .join(format!("{}.json", key))
    }
}

fn validate_bucket(bucket: &str) -> StorageResult<()> {
    if bucket.is_empty() || bucket == META_DIR || bucket.contains(['/', '\\']) || bucket == ".." {
        return Err(StorageError::InvalidKey(format!("bucket '{}'", bucket)));
    }
    Ok(())
}

async fn read_optional(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        storage_class: StorageClass,
    ) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        write_file(&path, &bytes).await?;

        let sidecar = Sidecar {
            content_type: content_type.map(str::to_string),
            storage_class: storage_class.as_str().to_string(),
            last_modified: Utc::now(),
        };
        write_file(
            &self.sidecar_path(bucket, key),
            &serde_json::to_vec(&sidecar)?,
        )
        .await
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        read_optional(&self.object_path(bucket, key)?).await
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let path = self.object_path(bucket, key)?;
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let sidecar: Option<Sidecar> = match read_optional(&self.sidecar_path(bucket, key)).await? {
            Some(raw) => Some(serde_json::from_slice(&raw)?),
            None => None,
        };

        Ok(Some(ObjectInfo {
            key: key.to_string(),
            size,
            content_type: sidecar.as_ref().and_then(|s| s.content_type.clone()),
            storage_class: sidecar
                .as_ref()
                .and_then(|s| StorageClass::parse(&s.storage_class))
                .unwrap_or_default(),
            last_modified: sidecar.map(|s| s.last_modified),
        }))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        validate_bucket(bucket)?;
        let bucket_root = self.root.join(bucket);
        let mut keys = Vec::new();
        let mut pending = vec![bucket_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(self.sidecar_path(bucket, key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(true)
    }
}

#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
    storage_class: StorageClass,
    last_modified: DateTime<Utc>,
}

/// In-memory object store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), MemoryObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets
    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn objects(
        &self,
    ) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<(String, String), MemoryObject>>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Database("object map lock poisoned".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        storage_class: StorageClass,
    ) -> StorageResult<()> {
        validate_bucket(bucket)?;
        validate_object_key(key)?;
        self.objects()?.insert(
            (bucket.to_string(), key.to_string()),
            MemoryObject {
                bytes,
                content_type: content_type.map(str::to_string),
                storage_class,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .objects()?
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.bytes.clone()))
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        Ok(self
            .objects()?
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| ObjectInfo {
                key: key.to_string(),
                size: o.bytes.len() as u64,
                content_type: o.content_type.clone(),
                storage_class: o.storage_class,
                last_modified: Some(o.last_modified),
            }))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .objects()?
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .objects()?
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some())
    }
}
