use crate::error::{RingError, RingResult};
use crate::membership::types::{MAX_KEY, Range};

use std::collections::BTreeMap;
use tokio::sync::{Mutex, MutexGuard};

/// Separator between records of a bulk transfer payload. Values may never contain it.
pub const RECORD_SEPARATOR: &str = "%0A";

/// The local key/value map of one node.
///
/// A single mutex guards the whole map. Point operations take it briefly;
/// bulk transfers take it through [`KeyStore::lock`] and keep it for the whole
/// copy so concurrent requests never observe a half-moved range.
#[derive(Debug, Default)]
pub struct KeyStore {
    entries: Mutex<BTreeMap<u32, String>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (u32, String)>) -> Self {
        Self {
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// Inserts a new entry. Existing keys are never overwritten.
    pub async fn insert(&self, key: u32, value: String) -> RingResult<()> {
        validate_entry(key, &value)?;
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&key) {
            return Err(RingError::KeyExists(format!("Key {} already exists.", key)));
        }
        entries.insert(key, value);
        Ok(())
    }

    pub async fn lookup(&self, key: u32) -> Option<String> {
        self.entries.lock().await.get(&key).cloned()
    }

    /// Returns whether an entry was removed.
    pub async fn delete(&self, key: u32) -> bool {
        self.entries.lock().await.remove(&key).is_some()
    }

    pub async fn entries(&self) -> Vec<(u32, String)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Exclusive access for bulk operations.
    pub async fn lock(&self) -> StoreGuard<'_> {
        StoreGuard {
            entries: self.entries.lock().await,
        }
    }
}

/// Held for the duration of a bulk copy.
pub struct StoreGuard<'a> {
    entries: MutexGuard<'a, BTreeMap<u32, String>>,
}

impl StoreGuard<'_> {
    /// Entries inside `range`, ascending by key.
    pub fn range_entries(&self, range: &Range) -> Vec<(u32, String)> {
        self.entries
            .iter()
            .filter(|(k, _)| range.contains(**k))
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn all_entries(&self) -> Vec<(u32, String)> {
        self.entries.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    /// Removes exactly the given keys; returns how many were present.
    pub fn remove_keys(&mut self, keys: impl IntoIterator<Item = u32>) -> usize {
        keys.into_iter()
            .filter(|k| self.entries.remove(k).is_some())
            .count()
    }

    /// Inserts received entries, skipping invalid records and keys already
    /// present. Returns how many entries were stored.
    pub fn absorb(&mut self, incoming: Vec<(u32, String)>) -> usize {
        let mut stored = 0;
        for (key, value) in incoming {
            if let Err(e) = validate_entry(key, &value) {
                tracing::warn!("Skipping transferred record for key {}: {}", key, e);
                continue;
            }
            if self.entries.contains_key(&key) {
                tracing::warn!(
                    "Transfer carried key {} which is already stored, keeping local value",
                    key
                );
                continue;
            }
            self.entries.insert(key, value);
            stored += 1;
        }
        stored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn validate_key(key: u32) -> RingResult<()> {
    if key > MAX_KEY {
        return Err(RingError::InvalidId(format!(
            "Key {} is outside the keyspace 0-{}",
            key, MAX_KEY
        )));
    }
    Ok(())
}

/// Values travel as single whitespace-free tokens inside transfer payloads.
pub fn validate_entry(key: u32, value: &str) -> RingResult<()> {
    validate_key(key)?;
    if value.is_empty()
        || value.contains(char::is_whitespace)
        || value.contains(RECORD_SEPARATOR)
    {
        return Err(RingError::MalformedRequest(format!(
            "Invalid value for key {}: values must be a single token without '{}'",
            key, RECORD_SEPARATOR
        )));
    }
    Ok(())
}
