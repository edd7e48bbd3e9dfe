/// Credential issuance
///
/// `login` authenticates a principal and mints an access credential plus a
/// refresh credential. Unknown identifiers and wrong secrets fail the same
/// way, after the same amount of bcrypt work.

use uuid::Uuid;

use crate::auth::context::AuthContext;
use crate::auth::jwt::generate_access_token;
use crate::auth::password::{verify_against_dummy, verify_password};
use crate::auth::principal::{PermissionSet, Principal, Role};
use crate::auth::refresh_token::{generate_refresh_token, RefreshTokenRecord};
use crate::error::{AppError, AuthError};
use crate::store::{AuditAction, AuditEvent, PrincipalRecord, RequestOrigin};
use crate::validators::is_valid_email;

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub principal: PrincipalRecord,
    pub tokens: IssuedTokens,
}

pub async fn login(
    ctx: &AuthContext,
    identifier: &str,
    secret: &str,
    origin: &RequestOrigin,
) -> Result<LoginOutcome, AppError> {
    // A malformed identifier cannot match an account; fail like any unknown one.
    let record = match is_valid_email(identifier) {
        Ok(email) => ctx.principals.find_by_email(&email).await?,
        Err(_) => None,
    };

    let record = match record {
        Some(record) => record,
        None => {
            verify_against_dummy(secret);
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    if !verify_password(secret, &record.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    if !record.is_active {
        tracing::warn!(principal_id = %record.id, "Login attempt on inactive account");
        return Err(AuthError::AccountInactive.into());
    }

    let tokens = issue_tokens(ctx, &record, None).await?;

    ctx.audit(AuditEvent::new(record.id, AuditAction::Login, "principals").with_origin(origin))
        .await;
    tracing::info!(principal_id = %record.id, role = %record.role, "Principal logged in");

    Ok(LoginOutcome {
        principal: record,
        tokens,
    })
}

/// Snapshot the principal's current role and permissions.
pub async fn resolve_principal(
    ctx: &AuthContext,
    record: &PrincipalRecord,
) -> Result<Principal, AppError> {
    let role = Role::from(record.role.as_str());
    let permissions = if role.is_administrator() {
        PermissionSet::default()
    } else {
        PermissionSet::from_codes(ctx.permissions.permissions_for_role(&record.role).await?)
    };

    Ok(Principal {
        id: record.id,
        email: record.email.clone(),
        role,
        permissions,
        permissions_version: record.permissions_version,
    })
}

/// Mint a new pair; `predecessor` links the refresh record into a rotation chain.
pub async fn issue_tokens(
    ctx: &AuthContext,
    record: &PrincipalRecord,
    predecessor: Option<Uuid>,
) -> Result<IssuedTokens, AppError> {
    let principal = resolve_principal(ctx, record).await?;
    let access_token = generate_access_token(&principal, &ctx.jwt)?;

    let refresh_token = generate_refresh_token();
    let refresh_record = RefreshTokenRecord::new(
        record.id,
        &refresh_token,
        ctx.jwt.refresh_token_expiry,
        predecessor,
    );
    ctx.refresh_tokens.insert(&refresh_record).await?;

    Ok(IssuedTokens {
        access_token,
        refresh_token,
        expires_in: ctx.jwt.access_token_expiry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::tests::test_context;
    use crate::auth::jwt::validate_access_token;
    use crate::auth::password::hash_password_with_cost;
    use crate::auth::refresh_token::hash_token;
    use crate::store::MemoryStore;

    fn seed(store: &MemoryStore, email: &str, role: &str, password: &str) -> PrincipalRecord {
        let hash = hash_password_with_cost(password, 4).unwrap();
        let record = PrincipalRecord::new(email, "Test Principal", role, &hash);
        store.add_principal(record.clone()).unwrap();
        record
    }

    #[tokio::test]
    async fn test_login_issues_pair_with_permission_snapshot() {
        let (ctx, store) = test_context();
        store.grant("archivist", "loans.create").unwrap();
        let record = seed(&store, "a@x.com", "archivist", "Correct123");

        let outcome = login(&ctx, "A@x.com", "Correct123", &RequestOrigin::default())
            .await
            .unwrap();

        let claims = validate_access_token(&outcome.tokens.access_token, &ctx.jwt).unwrap();
        assert_eq!(claims.sub, record.id.to_string());
        assert_eq!(claims.permissions, vec!["loans.create"]);

        let stored = store.refresh_records_for(record.id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].token_hash, hash_token(&outcome.tokens.refresh_token));
        assert!(stored[0].predecessor_id.is_none());
    }

    #[tokio::test]
    async fn test_unknown_identifier_and_wrong_secret_fail_identically() {
        let (ctx, store) = test_context();
        seed(&store, "a@x.com", "clerk", "Correct123");
        let origin = RequestOrigin::default();

        let unknown = login(&ctx, "nobody@x.com", "Correct123", &origin).await.unwrap_err();
        let wrong = login(&ctx, "a@x.com", "Wrong12345", &origin).await.unwrap_err();
        let garbage = login(&ctx, "not-an-email", "Wrong12345", &origin).await.unwrap_err();

        for err in [unknown, wrong, garbage] {
            assert_eq!(err.auth_error(), Some(&AuthError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_inactive_principal_is_refused() {
        let (ctx, store) = test_context();
        let record = seed(&store, "a@x.com", "clerk", "Correct123");
        store.set_active(record.id, false).unwrap();

        let err = login(&ctx, "a@x.com", "Correct123", &RequestOrigin::default())
            .await
            .unwrap_err();

        assert_eq!(err.auth_error(), Some(&AuthError::AccountInactive));
    }

    #[tokio::test]
    async fn test_login_emits_audit_event() {
        let (ctx, store) = test_context();
        let record = seed(&store, "a@x.com", "clerk", "Correct123");
        let origin = RequestOrigin {
            ip: Some("10.1.2.3".into()),
            user_agent: Some("archive-test".into()),
        };

        login(&ctx, "a@x.com", "Correct123", &origin).await.unwrap();

        let events = store.audit_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Login);
        assert_eq!(events[0].principal_id, Some(record.id));
        assert_eq!(events[0].ip_address.as_deref(), Some("10.1.2.3"));
    }
}
