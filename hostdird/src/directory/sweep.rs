use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use shared::types::HostRecord;
use crate::store::HostStore;
use super::{Clock, Result, TtlPolicy, bounded};

/// Read-triggered eviction. Every listing drops expired records from the
/// response and makes a best-effort attempt to delete them from storage.
pub struct Sweeper {
    store: Arc<dyn HostStore>,
    clock: Arc<dyn Clock>,
    policy: TtlPolicy,
    list_timeout: Duration,
    delete_timeout: Duration,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn HostStore>,
        clock: Arc<dyn Clock>,
        policy: TtlPolicy,
        list_timeout: Duration,
        delete_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            list_timeout,
            delete_timeout,
        }
    }

    /// Live records from a single snapshot. Whether a record is returned is
    /// decided before any delete runs, so a record whose delete fails is still
    /// left out.
    pub async fn sweep_and_list(&self) -> Result<Vec<HostRecord>> {
        let snapshot = bounded(self.list_timeout, self.store.list_all()).await?;
        let now = self.clock.now();

        let (live, expired): (Vec<_>, Vec<_>) = snapshot
            .into_iter()
            .partition(|host| self.policy.is_live(host.updated_at, now));

        if !expired.is_empty() {
            let evicted = self.evict(&expired).await;
            tracing::info!("Swept {} of {} expired hosts", evicted, expired.len());
        }

        Ok(live)
    }

    /// Delete each expired record concurrently, each under its own deadline.
    /// Failures are logged and dropped. Returns how many records were removed.
    async fn evict(&self, expired: &[HostRecord]) -> usize {
        let attempts = expired.iter().map(|host| async move {
            let result = tokio::time::timeout(self.delete_timeout, self.store.delete_by_id(&host.id)).await;
            match result {
                Ok(Ok(Some(_))) => {
                    tracing::debug!("Evicted host {} ({})", host.id, host.code);
                    true
                }
                // Already gone, e.g. a concurrent sweep got there first
                Ok(Ok(None)) => false,
                Ok(Err(e)) => {
                    tracing::warn!("Failed to evict host {}: {:#}", host.id, e);
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        "Evicting host {} took longer than {}ms, skipped",
                        host.id,
                        self.delete_timeout.as_millis()
                    );
                    false
                }
            }
        });

        join_all(attempts).await.into_iter().filter(|removed| *removed).count()
    }
}
