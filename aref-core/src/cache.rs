//! Time-boxed stage cache
//!
//! One JSON file per key holding `{data, expiry}`. Reads never delete: a
//! stale entry just reads as a miss and the next write overwrites it. Any
//! failure to read or decode an entry is treated exactly like a miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{CoreError, Result};

/// A persisted cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    pub expiry: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }
}

/// File-backed cache keyed by derived strings such as `shodan_example.com`
#[derive(Debug, Clone)]
pub struct StageCache {
    dir: PathBuf,
}

impl StageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive the cache key for a source lookup on a target
    pub fn key(source: &str, target: &str) -> String {
        format!("{source}_{target}")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    /// Look up a fresh entry
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up an entry as of `now`
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Cache miss for {}: {}", key, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Unreadable cache entry {}: {}", key, e);
                return None;
            }
        };

        if entry.is_fresh(now) {
            Some(entry.data)
        } else {
            debug!("Stale cache entry for {}", key);
            None
        }
    }

    /// Write (or overwrite) an entry that expires `ttl` from now
    pub async fn put(&self, key: &str, data: &Value, ttl: Duration) -> Result<()> {
        self.put_at(key, data, ttl, Utc::now()).await
    }

    pub async fn put_at(
        &self,
        key: &str,
        data: &Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CoreError::Config(format!("Cache TTL out of range: {e}")))?;
        let entry = CacheEntry {
            data: data.clone(),
            expiry: now + ttl,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::io(&self.dir, e))?;

        let path = self.path_for(key);
        let json = serde_json::to_vec(&entry)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| CoreError::io(&path, e))?;

        debug!("Cached {} until {}", key, entry.expiry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hit_before_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::new(dir.path());
        let data = json!({"os": "Linux", "ports": [22, 443]});

        cache.put("shodan_example.com", &data, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(cache.get("shodan_example.com").await, Some(data));
    }

    #[tokio::test]
    async fn test_miss_at_and_after_expiry_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::new(dir.path());
        let now = Utc::now();
        let data = json!({"ports": []});

        cache
            .put_at("shodan_8.8.8.8", &data, Duration::from_secs(60), now)
            .await
            .unwrap();

        let just_before = now + chrono::Duration::seconds(59);
        assert_eq!(cache.get_at("shodan_8.8.8.8", just_before).await, Some(data));

        let at_expiry = now + chrono::Duration::seconds(60);
        assert_eq!(cache.get_at("shodan_8.8.8.8", at_expiry).await, None);

        let later = now + chrono::Duration::seconds(600);
        assert_eq!(cache.get_at("shodan_8.8.8.8", later).await, None);

        // Stale entries are left on disk
        assert!(cache.path_for("shodan_8.8.8.8").exists());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::new(dir.path());
        let now = Utc::now();

        cache.put_at("k", &json!(1), Duration::from_secs(1), now).await.unwrap();
        cache.put_at("k", &json!(2), Duration::from_secs(3600), now).await.unwrap();

        let later = now + chrono::Duration::seconds(10);
        assert_eq!(cache.get_at("k", later).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StageCache::new(dir.path());
        std::fs::write(cache.path_for("broken"), b"not json").unwrap();

        assert_eq!(cache.get("broken").await, None);
        assert_eq!(cache.get("never-written").await, None);
    }

    #[test]
    fn test_key_and_path() {
        assert_eq!(StageCache::key("shodan", "example.com"), "shodan_example.com");
        let cache = StageCache::new("/tmp/c");
        assert_eq!(cache.path_for("a/b"), PathBuf::from("/tmp/c/a_b.json"));
    }
}
