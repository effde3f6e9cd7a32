pub mod db;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::types::HostRecord;

/// A host about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewHost {
    pub address: String,
    pub port: u16,
    pub code: String,
    pub at: DateTime<Utc>,
}

/// Collection of host records, backed by SQLite or memory.
///
/// Lookups and deletes return `Ok(None)` when the key does not match any record.
/// `Err` is reserved for storage faults.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Insert a host with a fresh id. Returns `Ok(None)` without writing when
    /// the join code is already held by another record.
    async fn insert(&self, host: NewHost) -> Result<Option<HostRecord>>;

    async fn get_by_id(&self, id: &str) -> Result<Option<HostRecord>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<HostRecord>>;

    async fn delete_by_id(&self, id: &str) -> Result<Option<HostRecord>>;

    async fn delete_by_code(&self, code: &str) -> Result<Option<HostRecord>>;

    /// Every stored record, live or not, oldest first
    async fn list_all(&self) -> Result<Vec<HostRecord>>;

    /// Set `updated_at` on an existing record
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<Option<HostRecord>>;
}

/// Storage for the single settings document.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self) -> Result<Option<serde_json::Value>>;

    /// Shallow-merge `patch` into the stored object, creating it if absent.
    /// Returns the merged document.
    async fn merge_settings(
        &self,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value>;
}

/// Fresh record id: 32 lowercase hex characters from a random UUID
pub fn new_host_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl NewHost {
    pub fn into_record(self, id: String) -> HostRecord {
        HostRecord {
            id,
            address: self.address,
            port: self.port,
            code: self.code,
            created_at: self.at,
            updated_at: self.at,
        }
    }
}

/// Overlay `patch`'s top-level keys onto `current`. A non-object `current` is replaced.
pub fn merge_object(
    current: Option<serde_json::Value>,
    patch: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let mut merged = match current {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    merged.extend(patch);
    serde_json::Value::Object(merged)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use super::*;
    use super::memory::MemoryStore;

    /// Wraps a `MemoryStore` with switches for injecting faults.
    #[derive(Default)]
    pub struct FaultyStore {
        pub inner: MemoryStore,
        pub fail_deletes: AtomicBool,
        pub codes_always_taken: AtomicBool,
        /// Milliseconds every call sleeps before reaching the inner store
        pub delay_ms: AtomicUsize,
        pub delete_calls: AtomicUsize,
        pub insert_calls: AtomicUsize,
    }

    impl FaultyStore {
        async fn pause(&self) {
            let ms = self.delay_ms.load(Ordering::SeqCst);
            if ms > 0 {
                tokio::time::sleep(Duration::from_millis(ms as u64)).await;
            }
        }
    }

    #[async_trait]
    impl HostStore for FaultyStore {
        async fn insert(&self, host: NewHost) -> Result<Option<HostRecord>> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if self.codes_always_taken.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.insert(host).await
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
            self.pause().await;
            self.inner.get_by_id(id).await
        }

        async fn get_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
            self.pause().await;
            self.inner.get_by_code(code).await
        }

        async fn delete_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if self.fail_deletes.load(Ordering::SeqCst) {
                anyhow::bail!("injected delete failure");
            }
            self.inner.delete_by_id(id).await
        }

        async fn delete_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            if self.fail_deletes.load(Ordering::SeqCst) {
                anyhow::bail!("injected delete failure");
            }
            self.inner.delete_by_code(code).await
        }

        async fn list_all(&self) -> Result<Vec<HostRecord>> {
            self.inner.list_all().await
        }

        async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<Option<HostRecord>> {
            self.pause().await;
            self.inner.touch(id, at).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_top_level_keys_only() {
        let current = json!({"global": {"inflation": 1.5, "mapSize": 51}, "player": {"tokenRate": 5.0}});
        let patch = json!({"player": {"tokenRate": 7.0}, "ai": []});

        let merged = merge_object(Some(current), patch.as_object().unwrap().clone());

        assert_eq!(merged["global"]["mapSize"], 51);
        assert_eq!(merged["player"], json!({"tokenRate": 7.0}));
        assert_eq!(merged["ai"], json!([]));
    }

    #[test]
    fn test_merge_into_nothing() {
        let patch = json!({"global": {"mapSize": 31}});
        let merged = merge_object(None, patch.as_object().unwrap().clone());
        assert_eq!(merged, patch);
    }
}
