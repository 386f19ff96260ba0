//! The durable rolling-window collections, behind a narrow async contract.
//!
//! The real backing store is an external collaborator with bounded capacity;
//! every write must tolerate rejection. [`MemoryRollingStore`] is the
//! in-process implementation used by the runtime and by tests, with the same
//! exhaustibility semantics as the real thing.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use adwatch_core_types::AdDescriptor;

/// Key of the ad-impression collection.
pub const ADS_KEY: &str = "ads_24h";

/// Key of the videos-seen collection.
pub const VIDEOS_KEY: &str = "videos_24h";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected a write for capacity reasons. Counting must stop
    /// until capacity is freed; it must never crash the coordinator.
    #[error("store capacity exhausted")]
    Exhausted,

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// One timestamped entry in a rolling-window collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterEntry {
    #[serde(rename = "subjectId")]
    pub subject_id: String,

    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,

    /// Ad entries carry the descriptor observed at count time.
    #[serde(rename = "extra", default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<AdDescriptor>,
}

impl CounterEntry {
    pub fn new(subject_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            subject_id: subject_id.into(),
            timestamp_ms,
            extra: None,
        }
    }

    pub fn with_descriptor(
        subject_id: impl Into<String>,
        timestamp_ms: i64,
        descriptor: AdDescriptor,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            timestamp_ms,
            extra: Some(descriptor),
        }
    }
}

/// Async get/set/invalidate contract over the rolling-window collections.
#[async_trait]
pub trait RollingStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<CounterEntry>, StoreError>;

    /// Replace the collection under `key`. May fail with
    /// [`StoreError::Exhausted`] when the backing store is out of capacity.
    async fn save(&self, key: &str, entries: &[CounterEntry]) -> Result<(), StoreError>;

    /// Drop the collection under `key` entirely.
    async fn invalidate(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store with a hard total-entry capacity.
pub struct MemoryRollingStore {
    capacity: usize,
    collections: DashMap<String, Vec<CounterEntry>>,
}

impl MemoryRollingStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            collections: DashMap::new(),
        }
    }

    fn total_excluding(&self, key: &str) -> usize {
        self.collections
            .iter()
            .filter(|entry| entry.key() != key)
            .map(|entry| entry.value().len())
            .sum()
    }
}

impl Default for MemoryRollingStore {
    fn default() -> Self {
        // Roughly what the external store fits at a few hundred bytes/entry.
        Self::new(10_000)
    }
}

#[async_trait]
impl RollingStore for MemoryRollingStore {
    async fn load(&self, key: &str) -> Result<Vec<CounterEntry>, StoreError> {
        Ok(self
            .collections
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, key: &str, entries: &[CounterEntry]) -> Result<(), StoreError> {
        if self.total_excluding(key) + entries.len() > self.capacity {
            return Err(StoreError::Exhausted);
        }
        self.collections.insert(key.to_string(), entries.to_vec());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), StoreError> {
        self.collections.remove(key);
        Ok(())
    }
}
