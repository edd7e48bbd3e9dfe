/// Refresh rotation
///
/// Redemption flips `used_at` with a compare-and-set before the child record
/// exists, so among concurrent redemptions of one token exactly one wins and
/// the rest observe reuse.

use chrono::Utc;
use uuid::Uuid;

use crate::auth::context::AuthContext;
use crate::auth::issuer::{issue_tokens, IssuedTokens};
use crate::auth::principal::Principal;
use crate::auth::refresh_token::{hash_token, RefreshTokenRecord};
use crate::error::{AppError, AuthError, RefreshError};
use crate::store::{AuditAction, AuditEvent, RequestOrigin};

pub async fn redeem(
    ctx: &AuthContext,
    presented: &str,
    origin: &RequestOrigin,
) -> Result<IssuedTokens, AppError> {
    let now = Utc::now();
    let record = ctx
        .refresh_tokens
        .find_by_hash(&hash_token(presented))
        .await?
        .ok_or(RefreshError::NotFound)?;

    if record.is_used() {
        return Err(handle_reuse(ctx, &record, origin).await);
    }
    if record.is_revoked {
        return Err(RefreshError::Revoked.into());
    }
    if record.is_expired_at(now) {
        return Err(RefreshError::Expired.into());
    }

    if !ctx.refresh_tokens.mark_used(record.id, now).await? {
        // Either another redemption won, or a revocation landed first.
        let current = ctx.refresh_tokens.find_by_hash(&record.token_hash).await?;
        if let Some(current) = current {
            if current.is_revoked && !current.is_used() {
                return Err(RefreshError::Revoked.into());
            }
        }
        return Err(handle_reuse(ctx, &record, origin).await);
    }

    let principal = ctx
        .principals
        .find_by_id(record.principal_id)
        .await?
        .ok_or(RefreshError::NotFound)?;
    if !principal.is_active {
        return Err(AuthError::AccountInactive.into());
    }

    let tokens = issue_tokens(ctx, &principal, Some(record.id)).await?;

    ctx.audit(
        AuditEvent::new(principal.id, AuditAction::TokenRefresh, "refresh_tokens")
            .with_origin(origin),
    )
    .await;
    tracing::info!(principal_id = %principal.id, predecessor_id = %record.id, "Refresh token rotated");

    Ok(tokens)
}

/// A consumed token came back: treat it as a compromise of its lineage.
async fn handle_reuse(
    ctx: &AuthContext,
    record: &RefreshTokenRecord,
    origin: &RequestOrigin,
) -> AppError {
    tracing::warn!(
        principal_id = %record.principal_id,
        record_id = %record.id,
        ip = ?origin.ip,
        "Refresh token reuse detected"
    );

    ctx.audit(
        AuditEvent::new(record.principal_id, AuditAction::TokenReuseDetected, "refresh_tokens")
            .with_origin(origin),
    )
    .await;

    if ctx.jwt.revoke_lineage_on_reuse {
        match ctx.refresh_tokens.revoke_descendants(record.id, Utc::now()).await {
            Ok(revoked) => {
                tracing::warn!(record_id = %record.id, revoked, "Revoked rotation lineage")
            }
            Err(e) => return e,
        }
    }

    RefreshError::ReuseDetected.into()
}

/// Revoke every outstanding refresh credential of a principal.
pub async fn revoke_all(ctx: &AuthContext, principal_id: Uuid) -> Result<u64, AppError> {
    let revoked = ctx
        .refresh_tokens
        .revoke_all_for_principal(principal_id, Utc::now())
        .await?;
    tracing::info!(principal_id = %principal_id, revoked, "Revoked all refresh tokens");
    Ok(revoked)
}

/// Ends one session, or all of them.
///
/// A presented token that does not belong to the caller is ignored rather
/// than revoked; with no token, or with `all_devices`, everything goes.
pub async fn logout(
    ctx: &AuthContext,
    principal: &Principal,
    refresh_token: Option<&str>,
    all_devices: bool,
    origin: &RequestOrigin,
) -> Result<u64, AppError> {
    let revoked = match refresh_token {
        Some(token) if !all_devices => {
            match ctx.refresh_tokens.find_by_hash(&hash_token(token)).await? {
                Some(record) if record.principal_id == principal.id => {
                    u64::from(ctx.refresh_tokens.revoke(record.id, Utc::now()).await?)
                }
                Some(_) => {
                    tracing::warn!(
                        principal_id = %principal.id,
                        "Logout presented a refresh token owned by another principal"
                    );
                    0
                }
                None => 0,
            }
        }
        _ => revoke_all(ctx, principal.id).await?,
    };

    ctx.audit(
        AuditEvent::new(principal.id, AuditAction::Logout, "refresh_tokens").with_origin(origin),
    )
    .await;
    tracing::info!(principal_id = %principal.id, revoked, "Principal logged out");

    Ok(revoked)
}
