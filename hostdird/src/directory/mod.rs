//! Host directory: registration, dual-key lookup and lazy expiry.

pub mod clock;
pub mod code;
pub mod service;
pub mod sweep;

pub use clock::{Clock, SystemClock, TtlPolicy};
pub use service::DirectoryService;
pub use sweep::Sweeper;

/// Outcomes the directory reports to its callers.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("host not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("no free join code after {attempts} attempts")]
    DirectoryFull { attempts: u32 },
}

impl DirectoryError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::StorageUnavailable(format!("{:#}", err))
    }
}

pub type Result<T, E = DirectoryError> = std::result::Result<T, E>;

/// Run a storage call under a deadline, folding faults and timeouts into
/// `StorageUnavailable`.
pub(crate) async fn bounded<T, F>(limit: std::time::Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DirectoryError::storage(e)),
        Err(_) => Err(DirectoryError::StorageUnavailable(format!(
            "no response within {}ms",
            limit.as_millis()
        ))),
    }
}
