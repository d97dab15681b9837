//! Per-collection checkpoint tracking
//!
//! All checkpoints live in one parameter as a JSON object keyed by collection:
//!
//! ```json
//! {"ENG": {"last_crawl_time": "2024-03-04T05:06:07.000Z", "updated_at": "..."}}
//! ```
//!
//! Every store call is retried with exponential backoff on transient errors.
//! Writes are read-modify-write of the whole object, so they are serialized
//! within the process to keep parallel collection workers from dropping each
//! other's keys.

use crate::config::CheckpointConfig;
use crate::storage::{ParameterStore, StorageError, StorageResult};
use crate::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Stored progress of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
    #[serde(with = "timestamp")]
    pub last_crawl_time: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

type CheckpointMap = BTreeMap<String, CrawlCheckpoint>;

/// Retrying wrapper around the checkpoint parameter
pub struct CrawlStateTracker {
    store: Arc<dyn ParameterStore>,
    parameter_name: String,
    max_attempts: u32,
    base_delay: Duration,
    write_lock: Mutex<()>,
}

impl CrawlStateTracker {
    pub fn new(store: Arc<dyn ParameterStore>, config: &CheckpointConfig) -> Self {
        Self::with_policy(
            store,
            &config.parameter_name,
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    pub fn with_policy(
        store: Arc<dyn ParameterStore>,
        parameter_name: &str,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Self {
        Self {
            store,
            parameter_name: parameter_name.to_string(),
            max_attempts: max_attempts.max(1),
            base_delay,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the last synchronized time of a collection
    ///
    /// `None` means the collection was never checkpointed; any store failure
    /// after retries is an error, never an implicit first run.
    pub async fn get_checkpoint(&self, collection_key: &str) -> Result<Option<DateTime<Utc>>> {
        let state = self.load().await?;
        Ok(state.get(collection_key).map(|c| c.last_crawl_time))
    }

    /// Records `timestamp` as the last synchronized time of a collection
    pub async fn save_checkpoint(&self, collection_key: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.load().await?;
        state.insert(
            collection_key.to_string(),
            CrawlCheckpoint {
                last_crawl_time: timestamp,
                updated_at: Utc::now(),
            },
        );
        self.store_state(&state).await?;

        debug!(
            "Checkpoint for {} saved at {}",
            collection_key,
            timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        Ok(())
    }

    /// Removes a collection's checkpoint, returning whether one existed
    pub async fn clear_checkpoint(&self, collection_key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.load().await?;
        if state.remove(collection_key).is_none() {
            return Ok(false);
        }
        self.store_state(&state).await?;

        info!("Cleared checkpoint for {}", collection_key);
        Ok(true)
    }

    /// Returns every stored checkpoint
    pub async fn all_checkpoints(&self) -> Result<BTreeMap<String, CrawlCheckpoint>> {
        self.load().await
    }

    async fn load(&self) -> Result<CheckpointMap> {
        let raw = self
            .with_retry("read", || self.store.get_parameter(&self.parameter_name))
            .await?;

        match raw {
            None => Ok(CheckpointMap::new()),
            Some(raw) if raw.trim().is_empty() => Ok(CheckpointMap::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                SyncError::CheckpointFormat(format!("parameter '{}': {}", self.parameter_name, e))
            }),
        }
    }

    async fn store_state(&self, state: &CheckpointMap) -> Result<()> {
        let value = serde_json::to_string(state)?;
        self.with_retry("write", || {
            self.store.put_parameter(&self.parameter_name, &value)
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(exhausted(attempt, e));
                    }

                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        "Checkpoint {} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn exhausted(attempts: u32, source: StorageError) -> SyncError {
    SyncError::Checkpoint { attempts, source }
}
