use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use shared::protocol::JOIN_CODE_LEN;

/// Derives a join code from a seed: the uppercased prefix of the seed's
/// SHA-256 hex digest. Same seed, same code. Uniqueness is the store's job.
pub fn generate(seed: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(seed));
    let len = JOIN_CODE_LEN.min(digest.len());
    digest[..len].to_ascii_uppercase()
}

/// Seed material for one generation attempt: the time plus 16 random bytes,
/// so two registrations in the same instant still diverge.
pub fn fresh_seed(now: DateTime<Utc>) -> Vec<u8> {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    let mut seed = nanos.to_le_bytes().to_vec();
    seed.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
    seed
}
