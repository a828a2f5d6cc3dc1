use chrono::{DateTime, Utc};
use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

const MEMORY_ENTRIES: usize = 32;

#[derive(Serialize, Deserialize)]
struct Envelope {
    stored_at: DateTime<Utc>,
    value: serde_json::Value,
}

#[derive(Clone)]
struct Entry {
    stored_at: DateTime<Utc>,
    value: serde_json::Value,
}

/// File-backed cache with a time-to-live. Every key maps to one
/// `<sha256>.cache` file; a small LRU keeps recently used entries in memory.
///
/// Read and write failures never surface: a broken entry is a miss and a
/// failed write is a no-op.
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
    memory: Mutex<LruCache<String, Entry>>,
}

pub fn hash_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Cache directory {} unavailable: {}", dir.display(), e);
        }
        Self {
            dir,
            ttl,
            memory: Mutex::new(LruCache::new(
                NonZeroUsize::new(MEMORY_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cache", hash_hex(key)))
    }

    fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        let age = Utc::now().signed_duration_since(stored_at);
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.memory.lock().get(key).cloned();
        let entry = match entry {
            Some(entry) => entry,
            None => {
                let entry = self.read_file(key)?;
                self.memory.lock().put(key.to_string(), entry.clone());
                entry
            }
        };

        if self.is_expired(entry.stored_at) {
            debug!("Cache entry expired: {}", key);
            self.memory.lock().pop(key);
            return None;
        }

        serde_json::from_value(entry.value).ok()
    }

    fn read_file(&self, key: &str) -> Option<Entry> {
        let bytes = fs::read(self.path_for(key)).ok()?;
        let envelope: Envelope = serde_json::from_slice(&bytes).ok()?;
        Some(Entry {
            stored_at: envelope.stored_at,
            value: envelope.value,
        })
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache error: {}", e);
                return;
            }
        };
        let envelope = Envelope {
            stored_at: Utc::now(),
            value,
        };

        let write = serde_json::to_vec(&envelope)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                fs::create_dir_all(&self.dir).map_err(|e| e.to_string())?;
                fs::write(self.path_for(key), bytes).map_err(|e| e.to_string())
            });
        if let Err(e) = write {
            warn!("Cache error: {}", e);
        }

        self.memory.lock().put(
            key.to_string(),
            Entry {
                stored_at: envelope.stored_at,
                value: envelope.value,
            },
        );
    }

    /// Removes every cache file and forgets in-memory entries.
    pub fn clear(&self) -> usize {
        self.memory.lock().clear();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "cache"))
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }
}
