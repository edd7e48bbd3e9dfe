use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{authorize, revoke_all, AuthContext, Principal};
use crate::error::AppError;
use crate::routes::auth::request_origin;
use crate::store::{AuditAction, AuditEvent};

pub const REVOKE_SESSIONS_PERMISSION: &str = "sessions.revoke";

#[derive(Serialize)]
pub struct RevokedResponse {
    pub revoked: u64,
}

/// POST /admin/principals/{id}/revoke-sessions
///
/// Forced invalidation of every refresh credential a principal holds.
pub async fn revoke_sessions(
    req: HttpRequest,
    path: web::Path<Uuid>,
    principal: web::ReqData<Principal>,
    ctx: web::Data<AuthContext>,
) -> Result<HttpResponse, AppError> {
    authorize(&ctx, &principal, REVOKE_SESSIONS_PERMISSION).await?;

    let target = path.into_inner();
    let revoked = revoke_all(&ctx, target).await?;

    ctx.audit(
        AuditEvent::new(target, AuditAction::SessionsRevoked, "refresh_tokens")
            .with_origin(&request_origin(&req)),
    )
    .await;
    tracing::warn!(
        admin_id = %principal.id,
        principal_id = %target,
        revoked,
        "Sessions revoked by administrator"
    );

    Ok(HttpResponse::Ok().json(RevokedResponse { revoked }))
}
