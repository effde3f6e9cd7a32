use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use crate::store::SettingsStore;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid API key")]
    Unauthorized,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// The game-balance settings document: readable by anyone, writable with the token.
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    token: Option<String>,
    timeout: Duration,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, token: Option<String>, timeout: Duration) -> Self {
        if token.is_none() {
            tracing::warn!("No settings token configured; settings updates are disabled");
        }
        Self { store, token, timeout }
    }

    pub async fn get(&self) -> Result<Option<serde_json::Value>, SettingsError> {
        self.bounded(self.store.get_settings()).await
    }

    /// Merge `body`'s top-level keys into the stored settings
    pub async fn update(
        &self,
        presented: Option<&str>,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, SettingsError> {
        self.authorize(presented)?;

        let serde_json::Value::Object(patch) = body else {
            return Err(SettingsError::InvalidInput("settings must be a JSON object".to_string()));
        };

        let merged = self.bounded(self.store.merge_settings(patch)).await?;
        tracing::info!("Settings updated");
        Ok(merged)
    }

    /// Check a presented token against the configured one in constant time
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), SettingsError> {
        let matches = match (self.token.as_deref(), presented) {
            (Some(expected), Some(given)) => bool::from(expected.as_bytes().ct_eq(given.as_bytes())),
            _ => false,
        };
        if matches {
            Ok(())
        } else {
            Err(SettingsError::Unauthorized)
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> Result<T, SettingsError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SettingsError::StorageUnavailable(format!("{:#}", e))),
            Err(_) => Err(SettingsError::StorageUnavailable("timed out".to_string())),
        }
    }
}
