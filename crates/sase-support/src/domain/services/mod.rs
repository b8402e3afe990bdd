//! Domain services

pub mod metadata;
pub mod sla;

pub use metadata::{fingerprint, merge_document, MetaDocument};
pub use sla::{human_time_diff, SlaCalculator, SlaTarget};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Opaque per-ticket access key.
///
/// Mixes the requester email, the creation time, a deployment secret and a
/// random UUID. Only uniqueness matters, so the digest is cut to 32 chars.
pub fn generate_ticket_key(email: &str, secret: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(now.format("%Y-%m-%d %H:%M:%S").to_string().as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let mut key = hex::encode(hasher.finalize());
    key.truncate(32);
    key
}
