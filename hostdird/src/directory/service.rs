use std::sync::Arc;
use std::time::Duration;
use shared::types::{HostRecord, RegisterRequest};
use crate::config::DirectoryConfig;
use crate::store::{HostStore, NewHost};
use super::{Clock, DirectoryError, Result, Sweeper, TtlPolicy, bounded, code};

/// The operations the API layer exposes over the host directory.
pub struct DirectoryService {
    store: Arc<dyn HostStore>,
    clock: Arc<dyn Clock>,
    sweeper: Sweeper,
    code_attempts: u32,
    storage_timeout: Duration,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn HostStore>, clock: Arc<dyn Clock>, config: &DirectoryConfig) -> Self {
        let sweeper = Sweeper::new(
            store.clone(),
            clock.clone(),
            TtlPolicy::new(config.ttl()),
            config.storage_timeout(),
            config.sweep_delete_timeout(),
        );

        Self {
            store,
            clock,
            sweeper,
            code_attempts: config.code_attempts.max(1),
            storage_timeout: config.storage_timeout(),
        }
    }

    /// Register a host and hand out a join code no other stored record holds.
    /// Each attempt draws a fresh seed; the store refuses codes already taken.
    pub async fn register(&self, request: RegisterRequest) -> Result<HostRecord> {
        let address = request
            .address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| DirectoryError::InvalidInput("address is required".to_string()))?;
        let port = request
            .port
            .ok_or_else(|| DirectoryError::InvalidInput("port is required".to_string()))?;

        for attempt in 1..=self.code_attempts {
            let now = self.clock.now();
            let host = NewHost {
                address: address.clone(),
                port,
                code: code::generate(&code::fresh_seed(now)),
                at: now,
            };
            let code = host.code.clone();

            match self.bounded(self.store.insert(host)).await? {
                Some(record) => {
                    tracing::info!(
                        "Registered host {} at {}:{} with code {}",
                        record.id,
                        record.address,
                        record.port,
                        record.code
                    );
                    return Ok(record);
                }
                None => tracing::debug!("Join code {} taken (attempt {})", code, attempt),
            }
        }

        tracing::warn!("Gave up finding a free join code after {} attempts", self.code_attempts);
        Err(DirectoryError::DirectoryFull {
            attempts: self.code_attempts,
        })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<HostRecord> {
        self.bounded(self.store.get_by_id(id))
            .await?
            .ok_or(DirectoryError::NotFound)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<HostRecord> {
        self.bounded(self.store.get_by_code(code))
            .await?
            .ok_or(DirectoryError::NotFound)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<HostRecord> {
        let host = self
            .bounded(self.store.delete_by_id(id))
            .await?
            .ok_or(DirectoryError::NotFound)?;
        tracing::info!("Deleted host {} ({})", host.id, host.code);
        Ok(host)
    }

    pub async fn delete_by_code(&self, code: &str) -> Result<HostRecord> {
        let host = self
            .bounded(self.store.delete_by_code(code))
            .await?
            .ok_or(DirectoryError::NotFound)?;
        tracing::info!("Deleted host {} ({})", host.id, host.code);
        Ok(host)
    }

    /// Restart a host's TTL. Its code and creation time are unchanged.
    pub async fn refresh(&self, id: &str) -> Result<HostRecord> {
        let now = self.clock.now();
        self.bounded(self.store.touch(id, now))
            .await?
            .ok_or(DirectoryError::NotFound)
    }

    /// Live hosts, oldest first. Expired hosts are evicted along the way.
    pub async fn list_live(&self) -> Result<Vec<HostRecord>> {
        self.sweeper.sweep_and_list().await
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        bounded(self.storage_timeout, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use chrono::Duration as TtlDuration;
    use crate::directory::clock::manual::ManualClock;
    use crate::store::db::HostDb;
    use crate::store::testing::FaultyStore;
    use crate::store_manager::StoreHandle;

    struct Fixture {
        store: Arc<FaultyStore>,
        clock: Arc<ManualClock>,
        service: DirectoryService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(FaultyStore::default());
        let clock = Arc::new(ManualClock::new());
        let service = DirectoryService::new(store.clone(), clock.clone(), &DirectoryConfig::default());
        Fixture { store, clock, service }
    }

    fn request(address: &str, port: u16) -> RegisterRequest {
        RegisterRequest {
            address: Some(address.to_string()),
            port: Some(port),
        }
    }

    fn is_join_code(code: &str) -> bool {
        code.len() == 6 && code.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let fx = fixture();
        let host = fx.service.register(request("10.0.0.5", 7777)).await.unwrap();

        assert_eq!(host.address, "10.0.0.5");
        assert_eq!(host.port, 7777);
        assert!(is_join_code(&host.code), "{:?} is not a join code", host.code);
        assert_eq!(host.created_at, host.updated_at);

        assert_eq!(fx.service.get_by_id(&host.id).await.unwrap(), host);
        assert_eq!(fx.service.get_by_code(&host.code).await.unwrap(), host);
        assert_eq!(fx.service.list_live().await.unwrap(), vec![host]);
    }

    #[tokio::test]
    async fn test_expires_after_ttl() {
        let fx = fixture();
        let host = fx.service.register(request("10.0.0.5", 7777)).await.unwrap();

        fx.clock.advance(TtlDuration::days(5) + TtlDuration::seconds(1));

        // Lookups do not sweep, so the record resolves until a listing runs
        assert_eq!(fx.service.get_by_id(&host.id).await.unwrap(), host);

        assert!(fx.service.list_live().await.unwrap().is_empty());
        assert!(matches!(fx.service.get_by_id(&host.id).await, Err(DirectoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_refresh_extends_life() {
        let fx = fixture();
        let host = fx.service.register(request("10.0.0.5", 7777)).await.unwrap();

        fx.clock.advance(TtlDuration::days(4));
        let refreshed = fx.service.refresh(&host.id).await.unwrap();
        assert_eq!(refreshed.code, host.code);
        assert_eq!(refreshed.created_at, host.created_at);
        assert!(refreshed.updated_at > host.updated_at);

        fx.clock.advance(TtlDuration::days(4));
        assert_eq!(fx.service.list_live().await.unwrap(), vec![refreshed]);

        assert!(matches!(fx.service.refresh("missing").await, Err(DirectoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_ids_and_codes_unique() {
        let fx = fixture();
        let mut ids = HashSet::new();
        let mut codes = HashSet::new();

        for port in 0..200u16 {
            let host = fx.service.register(request("10.0.0.5", 7000 + port)).await.unwrap();
            assert!(ids.insert(host.id));
            assert!(codes.insert(host.code));
        }
    }

    #[tokio::test]
    async fn test_delete_finality() {
        let fx = fixture();
        let a = fx.service.register(request("10.0.0.1", 1)).await.unwrap();
        let b = fx.service.register(request("10.0.0.2", 2)).await.unwrap();

        assert_eq!(fx.service.delete_by_id(&a.id).await.unwrap(), a);
        assert!(matches!(fx.service.get_by_id(&a.id).await, Err(DirectoryError::NotFound)));
        assert!(matches!(fx.service.delete_by_id(&a.id).await, Err(DirectoryError::NotFound)));

        assert_eq!(fx.service.delete_by_code(&b.code).await.unwrap(), b);
        assert!(matches!(fx.service.get_by_code(&b.code).await, Err(DirectoryError::NotFound)));

        assert!(fx.service.list_live().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected_before_storage() {
        let fx = fixture();

        let no_port = RegisterRequest { address: Some("10.0.0.5".to_string()), port: None };
        let blank = RegisterRequest { address: Some("   ".to_string()), port: Some(7777) };
        let no_address = RegisterRequest { address: None, port: Some(7777) };

        for req in [no_port, blank, no_address] {
            assert!(matches!(fx.service.register(req).await, Err(DirectoryError::InvalidInput(_))));
        }
        assert_eq!(fx.store.insert_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_address_kept_as_given() {
        let fx = fixture();
        let host = fx.service.register(request(" lobby.example.net ", 7777)).await.unwrap();
        assert_eq!(host.address, " lobby.example.net ");
    }

    #[tokio::test]
    async fn test_timed_out_registration_leaves_no_record() {
        let handle = StoreHandle::spawn(HostDb::open(":memory:").unwrap());
        let config = DirectoryConfig {
            storage_timeout_ms: 20,
            ..DirectoryConfig::default()
        };
        let service = DirectoryService::new(
            Arc::new(handle.clone()),
            Arc::new(ManualClock::new()),
            &config,
        );

        // The store thread is busy, so the insert sits in its queue past the deadline
        let release = handle.stall().await;
        let result = service.register(request("10.0.0.5", 7777)).await;
        assert!(matches!(result, Err(DirectoryError::StorageUnavailable(_))));

        drop(release);
        assert!(handle.list_all().await.unwrap().is_empty(), "Timed out insert must not be written");
    }

    #[tokio::test]
    async fn test_code_exhaustion() {
        let fx = fixture();
        fx.store.codes_always_taken.store(true, Ordering::SeqCst);

        let result = fx.service.register(request("10.0.0.5", 7777)).await;
        assert!(matches!(result, Err(DirectoryError::DirectoryFull { attempts: 8 })));
        assert_eq!(fx.store.insert_calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_storage_times_out() {
        let fx = fixture();
        fx.store.delay_ms.store(30_000, Ordering::SeqCst);

        let result = fx.service.get_by_code("ABCDEF").await;
        assert!(matches!(result, Err(DirectoryError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_over_sqlite() {
        let store = Arc::new(StoreHandle::spawn(HostDb::open(":memory:").unwrap()));
        let service = Arc::new(DirectoryService::new(
            store,
            Arc::new(ManualClock::new()),
            &DirectoryConfig::default(),
        ));

        let tasks: Vec<_> = (0..32u16)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.register(request("10.0.0.9", 9000 + i)).await })
            })
            .collect();

        let mut codes = HashSet::new();
        for task in tasks {
            let host = task.await.unwrap().unwrap();
            assert!(codes.insert(host.code));
        }
        assert_eq!(service.list_live().await.unwrap().len(), 32);
    }
}
