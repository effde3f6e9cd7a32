use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use shared::types::HostRecord;
use super::{HostStore, NewHost, SettingsStore, merge_object, new_host_id};

#[derive(Default)]
struct Tables {
    hosts: HashMap<String, HostRecord>,
    /// code -> id
    codes: HashMap<String, String>,
    settings: Option<serde_json::Value>,
}

/// Non-persistent backing. All state lives behind one lock so an insert's
/// code check and write happen together.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn remove(&mut self, id: &str) -> Option<HostRecord> {
        let host = self.hosts.remove(id)?;
        self.codes.remove(&host.code);
        Some(host)
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn insert(&self, host: NewHost) -> Result<Option<HostRecord>> {
        let mut tables = self.tables.write();
        if tables.codes.contains_key(&host.code) {
            return Ok(None);
        }

        let mut id = new_host_id();
        while tables.hosts.contains_key(&id) {
            id = new_host_id();
        }

        let record = host.into_record(id);
        tables.codes.insert(record.code.clone(), record.id.clone());
        tables.hosts.insert(record.id.clone(), record.clone());
        Ok(Some(record))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
        Ok(self.tables.read().hosts.get(id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        let tables = self.tables.read();
        Ok(tables.codes.get(code).and_then(|id| tables.hosts.get(id)).cloned())
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
        Ok(self.tables.write().remove(id))
    }

    async fn delete_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        let mut tables = self.tables.write();
        let Some(id) = tables.codes.get(code).cloned() else {
            return Ok(None);
        };
        Ok(tables.remove(&id))
    }

    async fn list_all(&self) -> Result<Vec<HostRecord>> {
        let mut hosts: Vec<HostRecord> = self.tables.read().hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(hosts)
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<Option<HostRecord>> {
        let mut tables = self.tables.write();
        Ok(tables.hosts.get_mut(id).map(|host| {
            host.updated_at = at;
            host.clone()
        }))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<Option<serde_json::Value>> {
        Ok(self.tables.read().settings.clone())
    }

    async fn merge_settings(
        &self,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut tables = self.tables.write();
        let merged = merge_object(tables.settings.take(), patch);
        tables.settings = Some(merged.clone());
        Ok(merged)
    }
}
