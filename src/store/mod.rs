//! Persistence ports for the credential lifecycle.
//!
//! Services only talk to these traits. `postgres` backs them with sqlx,
//! `memory` with mutex-guarded maps for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::recovery_token::{PasswordResetAttempt, RecoveryTokenRecord};
use crate::auth::refresh_token::RefreshTokenRecord;
use crate::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A principal as stored by the relational collaborator.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PrincipalRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub permissions_version: i32,
}

impl PrincipalRecord {
    pub fn new(email: &str, name: &str, role: &str, password_hash: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            is_active: true,
            permissions_version: 1,
        }
    }
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Lookup by normalized (lowercase) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PrincipalRecord>, AppError>;
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError>;
}

/// Role to permission mapping.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AppError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError>;
    /// Compare-and-set `used_at` from NULL to `at` on a non-revoked record.
    /// Returns true only for the single caller that performed the flip.
    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;
    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;
    /// Revoke every non-revoked record of a principal; returns the count.
    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;
    /// Revoke every record that descends from `id` through `predecessor_id`.
    async fn revoke_descendants(&self, id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait RecoveryTokenStore: Send + Sync {
    async fn insert(&self, record: &RecoveryTokenRecord) -> Result<(), AppError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RecoveryTokenRecord>, AppError>;
    /// Compare-and-set `used_at`; true only for the caller that consumed it.
    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;
    async fn record_attempt(&self, attempt: &PasswordResetAttempt) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Login,
    Logout,
    TokenRefresh,
    TokenReuseDetected,
    PasswordReset,
    SessionsRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::TokenRefresh => "TOKEN_REFRESH",
            AuditAction::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            AuditAction::PasswordReset => "PASSWORD_RESET",
            AuditAction::SessionsRevoked => "SESSIONS_REVOKED",
        }
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub principal_id: Option<Uuid>,
    pub action: AuditAction,
    pub table_name: &'static str,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(principal_id: Uuid, action: AuditAction, table_name: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id: Some(principal_id),
            action,
            table_name,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_origin(mut self, origin: &RequestOrigin) -> Self {
        self.ip_address = origin.ip.clone();
        self.user_agent = origin.user_agent.clone();
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError>;
}

/// Where a request came from, as far as the transport can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}
