use std::sync::Arc;

use crate::configuration::{JwtSettings, RecoverySettings};
use crate::email_client::Mailer;
use crate::store::{
    AuditEvent, AuditSink, MemoryStore, PermissionSource, PgStore, PrincipalStore,
    RecoveryTokenStore, RefreshTokenStore,
};

/// Everything the credential services need, passed explicitly.
#[derive(Clone)]
pub struct AuthContext {
    pub principals: Arc<dyn PrincipalStore>,
    pub permissions: Arc<dyn PermissionSource>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub recovery_tokens: Arc<dyn RecoveryTokenStore>,
    pub audit: Arc<dyn AuditSink>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtSettings,
    pub recovery: RecoverySettings,
}

impl AuthContext {
    pub fn postgres(
        store: PgStore,
        mailer: Arc<dyn Mailer>,
        jwt: JwtSettings,
        recovery: RecoverySettings,
    ) -> Self {
        let store = Arc::new(store);
        Self {
            principals: store.clone(),
            permissions: store.clone(),
            refresh_tokens: store.clone(),
            recovery_tokens: store.clone(),
            audit: store,
            mailer,
            jwt,
            recovery,
        }
    }

    pub fn in_memory(
        store: Arc<MemoryStore>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtSettings,
        recovery: RecoverySettings,
    ) -> Self {
        Self {
            principals: store.clone(),
            permissions: store.clone(),
            refresh_tokens: store.clone(),
            recovery_tokens: store.clone(),
            audit: store,
            mailer,
            jwt,
            recovery,
        }
    }

    /// Audit writes never fail the operation they describe.
    pub async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event).await {
            tracing::error!(
                error = %e,
                action = event.action.as_str(),
                principal_id = ?event.principal_id,
                "Failed to write audit event"
            );
        }
    }
}
