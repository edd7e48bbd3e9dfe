use chrono::{DateTime, Duration, Utc};
use rand::{thread_rng, RngCore};
use uuid::Uuid;

use crate::auth::refresh_token::hash_token;

/// 256-bit random recovery token, hex encoded.
pub fn generate_recovery_token() -> String {
    let mut bytes = [0u8; 32];
    thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A single-use password recovery token. Only the hash is persisted.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct RecoveryTokenRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub token_hash: String,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub request_ip: Option<String>,
}

impl RecoveryTokenRecord {
    pub fn new(
        principal_id: Uuid,
        token: &str,
        email: String,
        ttl_minutes: i64,
        request_ip: Option<String>,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            principal_id,
            token_hash: hash_token(token),
            email,
            issued_at,
            expires_at: issued_at + Duration::minutes(ttl_minutes),
            used_at: None,
            request_ip,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && !self.is_expired_at(now)
    }
}

/// Outcome of one `forgot-password` request, kept for abuse analysis.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct PasswordResetAttempt {
    pub id: Uuid,
    pub email: String,
    pub ip_address: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl PasswordResetAttempt {
    pub fn succeeded(email: &str, ip: Option<&str>) -> Self {
        Self::new(email, ip, true, None)
    }

    pub fn failed(email: &str, ip: Option<&str>, reason: &str) -> Self {
        Self::new(email, ip, false, Some(reason.to_string()))
    }

    fn new(email: &str, ip: Option<&str>, success: bool, failure_reason: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            ip_address: ip.map(str::to_string),
            success,
            failure_reason,
            attempted_at: Utc::now(),
        }
    }
}
