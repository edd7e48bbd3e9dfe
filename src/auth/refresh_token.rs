/// Refresh Token primitives
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character alphanumeric strings (~381 bits)
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: redemption flips `used_at` once and creates a child record
/// - Linked to the record they replaced through `predecessor_id`

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// The token is returned in plaintext (this is what the client stores).
/// The server stores only the SHA-256 hash.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest used as the lookup key for opaque tokens
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persisted state of one refresh credential.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub predecessor_id: Option<Uuid>,
}

impl RefreshTokenRecord {
    /// Build the record for a freshly generated token.
    pub fn new(
        principal_id: Uuid,
        token: &str,
        expiry_seconds: i64,
        predecessor_id: Option<Uuid>,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            principal_id,
            token_hash: hash_token(token),
            issued_at,
            expires_at: issued_at + Duration::seconds(expiry_seconds),
            used_at: None,
            is_revoked: false,
            revoked_at: None,
            predecessor_id,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Usable iff never used, never revoked and not yet expired.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_revoked && !self.is_expired_at(now)
    }
}
