//! Negative cache of signatures already judged to be duplicates.
//!
//! All entries live in one JSON document in the key-value store. Entries are
//! only replaced by key or dropped all at once by `clear`; nothing expires.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::dedup::signature::CacheKey;
use crate::storage::{self, StorageManager};

/// Store identifier of the cache document.
pub const CACHE_DOCUMENT: &str = "signature_cache.json";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] std::io::Error),

    #[error("cache lock poisoned")]
    Poisoned,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Top similarity score observed when the content was rejected.
    pub score: f32,
    /// Epoch milliseconds of the last write.
    pub timestamp: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

pub struct SignatureCache {
    store: Arc<dyn StorageManager>,
    /// Serializes read-modify-write cycles on the cache document.
    write_lock: Mutex<()>,
}

impl SignatureCache {
    pub fn new(store: Arc<dyn StorageManager>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn has(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.load()?.iter().any(|entry| &entry.key == key))
    }

    pub fn get(&self, key: &CacheKey) -> Result<Option<f32>, CacheError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|entry| &entry.key == key)
            .map(|entry| entry.score))
    }

    pub fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.load()?.into_iter().find(|entry| &entry.key == key))
    }

    /// Insert or overwrite the entry for `key`, refreshing its timestamp.
    pub fn put(&self, key: &CacheKey, score: f32) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().map_err(|_| CacheError::Poisoned)?;

        let mut entries = self.load()?;
        let entry = CacheEntry {
            key: key.clone(),
            score: clamp_score(score),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        match entries.iter_mut().find(|existing| existing.key == *key) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }

        self.save(&entries)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().map_err(|_| CacheError::Poisoned)?;
        self.save(&[])
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut keys: Vec<String> = self
            .load()?
            .into_iter()
            .map(|entry| entry.key.to_string())
            .collect();
        keys.sort();

        Ok(CacheStats {
            size: keys.len(),
            keys,
        })
    }

    fn load(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(storage::read_json(self.store.as_ref(), CACHE_DOCUMENT)?.unwrap_or_default())
    }

    fn save(&self, entries: &[CacheEntry]) -> Result<(), CacheError> {
        storage::write_json(self.store.as_ref(), CACHE_DOCUMENT, &entries)?;
        Ok(())
    }
}

fn clamp_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
