use std::thread;
use tokio::sync::{mpsc, oneshot};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::types::HostRecord;
use crate::store::{HostStore, NewHost, SettingsStore, db::HostDb};

type Reply<T> = oneshot::Sender<Result<T>>;
type Settings = serde_json::Map<String, serde_json::Value>;

/// Commands sent to the store thread
pub enum StoreCommand {
    Insert(NewHost, Reply<Option<HostRecord>>),
    GetById(String, Reply<Option<HostRecord>>),
    GetByCode(String, Reply<Option<HostRecord>>),
    DeleteById(String, Reply<Option<HostRecord>>),
    DeleteByCode(String, Reply<Option<HostRecord>>),
    ListAll(Reply<Vec<HostRecord>>),
    Touch {
        id: String,
        at: DateTime<Utc>,
        reply: Reply<Option<HostRecord>>,
    },
    GetSettings(Reply<Option<serde_json::Value>>),
    MergeSettings(Settings, Reply<serde_json::Value>),
    /// Blocks the thread until the sender side is dropped or signalled
    #[cfg(test)]
    Stall(std::sync::Mutex<std::sync::mpsc::Receiver<()>>),
    Shutdown,
}

/// A caller that stopped waiting (its deadline passed) has dropped the reply
/// receiver. Its write is skipped so the store never holds a change the
/// caller was told had failed.
fn abandoned<T>(reply: &Reply<T>, op: &str) -> bool {
    let closed = reply.is_closed();
    if closed {
        tracing::debug!("Skipping {} abandoned by its caller", op);
    }
    closed
}

/// Handle to the thread that owns the SQLite connection
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn the store thread with the given database
    pub fn spawn(db: HostDb) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::Insert(host, reply) => {
                        if !abandoned(&reply, "insert") {
                            let _ = reply.send(db.insert_host(host));
                        }
                    }
                    StoreCommand::GetById(id, reply) => {
                        let _ = reply.send(db.get_host(&id));
                    }
                    StoreCommand::GetByCode(code, reply) => {
                        let _ = reply.send(db.get_host_by_code(&code));
                    }
                    StoreCommand::DeleteById(id, reply) => {
                        if !abandoned(&reply, "delete") {
                            let _ = reply.send(db.delete_host(&id));
                        }
                    }
                    StoreCommand::DeleteByCode(code, reply) => {
                        if !abandoned(&reply, "delete") {
                            let _ = reply.send(db.delete_host_by_code(&code));
                        }
                    }
                    StoreCommand::ListAll(reply) => {
                        let _ = reply.send(db.get_all_hosts());
                    }
                    StoreCommand::Touch { id, at, reply } => {
                        if !abandoned(&reply, "refresh") {
                            let _ = reply.send(db.touch_host(&id, at));
                        }
                    }
                    StoreCommand::GetSettings(reply) => {
                        let _ = reply.send(db.get_settings());
                    }
                    StoreCommand::MergeSettings(patch, reply) => {
                        if !abandoned(&reply, "settings update") {
                            let _ = reply.send(db.merge_settings(patch));
                        }
                    }
                    #[cfg(test)]
                    StoreCommand::Stall(release) => {
                        let _ = release.lock().map(|rx| rx.recv());
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(&self, cmd: impl FnOnce(Reply<T>) -> StoreCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(cmd(reply)).await?;
        rx.await?
    }

    /// Park the store thread until the returned sender is dropped
    #[cfg(test)]
    pub(crate) async fn stall(&self) -> std::sync::mpsc::Sender<()> {
        let (release, wait) = std::sync::mpsc::channel();
        let _ = self.tx.send(StoreCommand::Stall(std::sync::Mutex::new(wait))).await;
        release
    }

    /// Stop the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}

#[async_trait]
impl HostStore for StoreHandle {
    async fn insert(&self, host: NewHost) -> Result<Option<HostRecord>> {
        self.request(|reply| StoreCommand::Insert(host, reply)).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
        self.request(|reply| StoreCommand::GetById(id.to_string(), reply)).await
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        self.request(|reply| StoreCommand::GetByCode(code.to_string(), reply)).await
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<HostRecord>> {
        self.request(|reply| StoreCommand::DeleteById(id.to_string(), reply)).await
    }

    async fn delete_by_code(&self, code: &str) -> Result<Option<HostRecord>> {
        self.request(|reply| StoreCommand::DeleteByCode(code.to_string(), reply)).await
    }

    async fn list_all(&self) -> Result<Vec<HostRecord>> {
        self.request(StoreCommand::ListAll).await
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<Option<HostRecord>> {
        let id = id.to_string();
        self.request(|reply| StoreCommand::Touch { id, at, reply }).await
    }
}

#[async_trait]
impl SettingsStore for StoreHandle {
    async fn get_settings(&self) -> Result<Option<serde_json::Value>> {
        self.request(StoreCommand::GetSettings).await
    }

    async fn merge_settings(&self, patch: Settings) -> Result<serde_json::Value> {
        self.request(|reply| StoreCommand::MergeSettings(patch, reply)).await
    }
}
