use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered game host.
/// This is the canonical data model used by the directory daemon, its API, and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    /// Opaque identifier assigned by the directory, never reused
    pub id: String,

    /// Network address supplied by the host, e.g. "10.0.0.5"
    pub address: String,

    /// Port the game server listens on
    pub port: u16,

    /// Short uppercase join code, e.g. "3FA9C0"
    pub code: String,

    /// When the host registered
    pub created_at: DateTime<Utc>,

    /// Last registration or refresh; drives expiry
    pub updated_at: DateTime<Utc>,
}

/// Body of a registration request. Both fields are required; they are optional
/// here so that a missing field is reported as invalid input rather than a
/// deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Response to a delete, carrying the record that was removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedHost {
    pub message: String,
    pub host: HostRecord,
}

impl RemovedHost {
    pub fn new(host: HostRecord) -> Self {
        Self {
            message: format!("Removed host with id: {}", host.id),
            host,
        }
    }
}
