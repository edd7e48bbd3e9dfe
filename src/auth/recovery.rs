/// Password recovery
///
/// `request_reset` never tells the caller what happened; the true outcome
/// lives only in the reset-attempt log. `reset_password` consumes the token
/// with a compare-and-set and then ends every session of the principal.

use chrono::Utc;

use crate::auth::context::AuthContext;
use crate::auth::password::{hash_password, validate_password_strength};
use crate::auth::recovery_token::{generate_recovery_token, PasswordResetAttempt, RecoveryTokenRecord};
use crate::auth::refresh_token::hash_token;
use crate::auth::rotation::revoke_all;
use crate::email_client::password_reset_message;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::store::{AuditAction, AuditEvent, RequestOrigin};
use crate::validators::is_valid_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResetOutcome {
    Sent,
    InvalidEmail,
    UnknownEmail,
    InactiveAccount,
    DeliveryFailed,
}

impl ResetOutcome {
    fn failure_reason(&self) -> Option<&'static str> {
        match self {
            ResetOutcome::Sent => None,
            ResetOutcome::InvalidEmail => Some("invalid_email"),
            ResetOutcome::UnknownEmail => Some("unknown_email"),
            ResetOutcome::InactiveAccount => Some("inactive_account"),
            ResetOutcome::DeliveryFailed => Some("delivery_failed"),
        }
    }
}

/// Run `request_reset` off the request path.
///
/// Account lookup, token insert and mail delivery only happen for existing
/// accounts, so awaiting them would let response time reveal existence.
pub fn spawn_request_reset(
    ctx: AuthContext,
    email: String,
    ip: Option<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { request_reset(&ctx, &email, ip.as_deref()).await })
}

/// Start a recovery. Infallible from the caller's point of view.
pub async fn request_reset(ctx: &AuthContext, email: &str, ip: Option<&str>) {
    let (normalized, outcome) = match is_valid_email(email) {
        Ok(normalized) => {
            let outcome = match send_recovery_token(ctx, &normalized, ip).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    ErrorContext::new("request_password_reset").log_error(&e);
                    ResetOutcome::DeliveryFailed
                }
            };
            (normalized, outcome)
        }
        Err(_) => (email.trim().chars().take(254).collect(), ResetOutcome::InvalidEmail),
    };

    let attempt = match outcome.failure_reason() {
        None => PasswordResetAttempt::succeeded(&normalized, ip),
        Some(reason) => PasswordResetAttempt::failed(&normalized, ip, reason),
    };
    if let Err(e) = ctx.recovery_tokens.record_attempt(&attempt).await {
        ErrorContext::new("record_reset_attempt").log_error(&e);
    }

    tracing::info!(success = attempt.success, reason = ?attempt.failure_reason, "Password reset requested");
}

async fn send_recovery_token(
    ctx: &AuthContext,
    email: &str,
    ip: Option<&str>,
) -> Result<ResetOutcome, AppError> {
    let principal = match ctx.principals.find_by_email(email).await? {
        Some(principal) => principal,
        None => return Ok(ResetOutcome::UnknownEmail),
    };
    if !principal.is_active {
        return Ok(ResetOutcome::InactiveAccount);
    }

    let token = generate_recovery_token();
    let record = RecoveryTokenRecord::new(
        principal.id,
        &token,
        principal.email.clone(),
        ctx.recovery.token_ttl_minutes,
        ip.map(str::to_string),
    );
    ctx.recovery_tokens.insert(&record).await?;

    let (subject, html, text) =
        password_reset_message(&ctx.recovery.reset_url, &token, ctx.recovery.token_ttl_minutes);
    if let Err(e) = ctx.mailer.send_email(&principal.email, &subject, &html, &text).await {
        ErrorContext::new("send_recovery_email")
            .with_principal_id(principal.id)
            .log_error(&e);
        return Ok(ResetOutcome::DeliveryFailed);
    }

    Ok(ResetOutcome::Sent)
}

/// Redeem a recovery token and set a new secret.
pub async fn reset_password(
    ctx: &AuthContext,
    token: &str,
    new_password: &str,
    origin: &RequestOrigin,
) -> Result<(), AppError> {
    // Reject a weak secret before the token is spent.
    validate_password_strength(new_password)?;

    let now = Utc::now();
    let record = ctx
        .recovery_tokens
        .find_by_hash(&hash_token(token))
        .await?
        .filter(|record| record.is_valid_at(now))
        .ok_or(AuthError::RecoveryTokenInvalidOrExpired)?;

    let password_hash = hash_password(new_password)?;

    if !ctx.recovery_tokens.mark_used(record.id, now).await? {
        return Err(AuthError::RecoveryTokenInvalidOrExpired.into());
    }

    ctx.principals
        .update_password_hash(record.principal_id, &password_hash)
        .await?;
    let revoked = revoke_all(ctx, record.principal_id).await?;

    ctx.audit(
        AuditEvent::new(record.principal_id, AuditAction::PasswordReset, "principals")
            .with_origin(origin),
    )
    .await;
    tracing::info!(principal_id = %record.principal_id, revoked, "Password reset completed");

    Ok(())
}
