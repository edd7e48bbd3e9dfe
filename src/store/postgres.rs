use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::recovery_token::{PasswordResetAttempt, RecoveryTokenRecord};
use crate::auth::refresh_token::RefreshTokenRecord;
use crate::error::AppError;
use crate::store::{
    AuditEvent, AuditSink, PermissionSource, PrincipalRecord, PrincipalStore, RecoveryTokenStore,
    RefreshTokenStore,
};

/// Postgres-backed implementation of every store port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<PrincipalRecord>, AppError> {
        let record = sqlx::query_as::<_, PrincipalRecord>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, permissions_version
            FROM principals
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PrincipalRecord>, AppError> {
        let record = sqlx::query_as::<_, PrincipalRecord>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, permissions_version
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE principals
            SET password_hash = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PermissionSource for PgStore {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<String>, AppError> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions WHERE role = $1 ORDER BY permission",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        Ok(codes)
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (id, principal_id, token_hash, issued_at, expires_at, used_at, is_revoked, revoked_at, predecessor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.principal_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.used_at)
        .bind(record.is_revoked)
        .bind(record.revoked_at)
        .bind(record.predecessor_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, principal_id, token_hash, issued_at, expires_at, used_at, is_revoked, revoked_at, predecessor_id
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET used_at = $1
            WHERE id = $2 AND used_at IS NULL AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE principal_id = $2 AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_descendants(&self, id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE lineage AS (
                SELECT id FROM refresh_tokens WHERE predecessor_id = $2
                UNION ALL
                SELECT child.id
                FROM refresh_tokens child
                JOIN lineage parent ON child.predecessor_id = parent.id
            )
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id IN (SELECT id FROM lineage) AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecoveryTokenStore for PgStore {
    async fn insert(&self, record: &RecoveryTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO password_recovery_tokens
                (id, principal_id, token_hash, email, issued_at, expires_at, used_at, request_ip)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.principal_id)
        .bind(&record.token_hash)
        .bind(&record.email)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.used_at)
        .bind(&record.request_ip)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RecoveryTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RecoveryTokenRecord>(
            r#"
            SELECT id, principal_id, token_hash, email, issued_at, expires_at, used_at, request_ip
            FROM password_recovery_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE password_recovery_tokens
            SET used_at = $1
            WHERE id = $2 AND used_at IS NULL AND expires_at > $1
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_attempt(&self, attempt: &PasswordResetAttempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_attempts
                (id, email, ip_address, success, failure_reason, attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.id)
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(attempt.success)
        .bind(&attempt.failure_reason)
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn record(&self, event: &AuditEvent) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, principal_id, action, table_name, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id)
        .bind(event.principal_id)
        .bind(event.action.as_str())
        .bind(event.table_name)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
