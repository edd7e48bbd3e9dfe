use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::recovery_token::{PasswordResetAttempt, RecoveryTokenRecord};
use crate::auth::refresh_token::RefreshTokenRecord;
use crate::error::{AppError, DatabaseError};
use crate::store::{
    AuditEvent, AuditSink, PermissionSource, PrincipalRecord, PrincipalStore, RecoveryTokenStore,
    RefreshTokenStore,
};

/// In-process store for tests and local development.
///
/// Each table is guarded by its own mutex; compare-and-set operations hold
/// the table lock across the check and the write.
#[derive(Default)]
pub struct MemoryStore {
    principals: Mutex<HashMap<Uuid, PrincipalRecord>>,
    role_permissions: Mutex<HashMap<String, Vec<String>>>,
    refresh_tokens: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
    recovery_tokens: Mutex<HashMap<Uuid, RecoveryTokenRecord>>,
    reset_attempts: Mutex<Vec<PasswordResetAttempt>>,
    audit_log: Mutex<Vec<AuditEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_principal(&self, record: PrincipalRecord) -> Result<(), AppError> {
        let mut principals = lock(&self.principals)?;
        if principals.values().any(|p| p.email == record.email) {
            return Err(DatabaseError::UniqueConstraintViolation(record.email).into());
        }
        principals.insert(record.id, record);
        Ok(())
    }

    pub fn grant(&self, role: &str, permission: &str) -> Result<(), AppError> {
        let mut map = lock(&self.role_permissions)?;
        let codes = map.entry(role.to_string()).or_default();
        if !codes.iter().any(|c| c == permission) {
            codes.push(permission.to_string());
        }
        Ok(())
    }

    /// Simulates an admin changing a principal's role or permissions.
    pub fn bump_permissions_version(&self, principal_id: Uuid) -> Result<(), AppError> {
        let mut principals = lock(&self.principals)?;
        let record = principals
            .get_mut(&principal_id)
            .ok_or_else(|| DatabaseError::NotFound(principal_id.to_string()))?;
        record.permissions_version += 1;
        Ok(())
    }

    pub fn set_active(&self, principal_id: Uuid, active: bool) -> Result<(), AppError> {
        let mut principals = lock(&self.principals)?;
        let record = principals
            .get_mut(&principal_id)
            .ok_or_else(|| DatabaseError::NotFound(principal_id.to_string()))?;
        record.is_active = active;
        Ok(())
    }

    pub fn refresh_records_for(&self, principal_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let mut records: Vec<_> = lock(&self.refresh_tokens)?
            .values()
            .filter(|r| r.principal_id == principal_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.issued_at);
        Ok(records)
    }

    pub fn recovery_records_for(&self, principal_id: Uuid) -> Result<Vec<RecoveryTokenRecord>, AppError> {
        Ok(lock(&self.recovery_tokens)?
            .values()
            .filter(|r| r.principal_id == principal_id)
            .cloned()
            .collect())
    }

    pub fn reset_attempts(&self) -> Result<Vec<PasswordResetAttempt>, AppError> {
        Ok(lock(&self.reset_attempts)?.clone())
    }

    pub fn audit_events(&self) -> Result<Vec<AuditEvent>, AppError> {
        Ok(lock(&self.audit_log)?.clone())
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, AppError> {
        Ok(lock(&self.principals)?
            .values()
            .find(|p| p.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PrincipalRecord>, AppError> {
        Ok(lock(&self.principals)?.get(&id).cloned())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        let mut principals = lock(&self.principals)?;
        let record = principals
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))?;
        record.password_hash = password_hash.to_string();
        Ok(())
    }
}

#[async_trait]
impl PermissionSource for MemoryStore {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AppError> {
        Ok(lock(&self.role_permissions)?
            .get(role)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        let mut records = lock(&self.refresh_tokens)?;
        if records.values().any(|r| r.token_hash == record.token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation("token_hash".into()).into());
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(lock(&self.refresh_tokens)?
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = lock(&self.refresh_tokens)?;
        match records.get_mut(&id) {
            Some(record) if record.used_at.is_none() && !record.is_revoked => {
                record.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = lock(&self.refresh_tokens)?;
        match records.get_mut(&id) {
            Some(record) if !record.is_revoked => {
                record.is_revoked = true;
                record.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut records = lock(&self.refresh_tokens)?;
        let mut count = 0;
        for record in records
            .values_mut()
            .filter(|r| r.principal_id == principal_id && !r.is_revoked)
        {
            record.is_revoked = true;
            record.revoked_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn revoke_descendants(&self, id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = lock(&self.refresh_tokens)?;
        let mut frontier = vec![id];
        let mut count = 0;

        while let Some(parent) = frontier.pop() {
            let children: Vec<Uuid> = records
                .values()
                .filter(|r| r.predecessor_id == Some(parent))
                .map(|r| r.id)
                .collect();

            for child in children {
                if let Some(record) = records.get_mut(&child) {
                    if !record.is_revoked {
                        record.is_revoked = true;
                        record.revoked_at = Some(at);
                        count += 1;
                    }
                }
                frontier.push(child);
            }
        }

        Ok(count)
    }
}

#[async_trait]
impl RecoveryTokenStore for MemoryStore {
    async fn insert(&self, record: &RecoveryTokenRecord) -> Result<(), AppError> {
        lock(&self.recovery_tokens)?.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RecoveryTokenRecord>, AppError> {
        Ok(lock(&self.recovery_tokens)?
            .values()
            .find(|r| r.token_hash == token_hash)
            .cloned())
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut records = lock(&self.recovery_tokens)?;
        match records.get_mut(&id) {
            Some(record) if record.is_valid_at(at) => {
                record.used_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_attempt(&self, attempt: &PasswordResetAttempt) -> Result<(), AppError> {
        lock(&self.reset_attempts)?.push(attempt.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError> {
        lock(&self.audit_log)?.push(event.clone());
        Ok(())
    }
}
