/// Authentication Routes
///
/// Login, refresh rotation, logout, password recovery and the current
/// principal. Bodies are camelCase JSON.

use std::net::{IpAddr, Ipv4Addr};

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{self, AuthContext, IssuedTokens, Principal};
use crate::error::{AppError, ErrorContext};
use crate::security::RateLimiterManager;
use crate::store::RequestOrigin;

const TOKEN_TYPE: &str = "Bearer";
const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that address, a recovery link has been sent.";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub all_devices: bool,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(tokens: IssuedTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: TOKEN_TYPE,
            expires_in: tokens.expires_in,
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Serialize)]
pub struct PrincipalResponse {
    pub id: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Client IP and user agent as seen by the transport.
pub fn request_origin(req: &HttpRequest) -> RequestOrigin {
    RequestOrigin {
        ip: req.connection_info().realip_remote_addr().map(str::to_string),
        user_agent: req
            .headers()
            .get(actix_web::http::header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string),
    }
}

/// POST /auth/login
///
/// # Errors
/// - 401: Invalid credentials (unknown email and wrong password look the same)
/// - 403: Account is inactive
/// - 429: Too many attempts from this address
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    ctx: web::Data<AuthContext>,
    limiter: web::Data<RateLimiterManager>,
) -> Result<HttpResponse, AppError> {
    let origin = request_origin(&req);
    // Forwarded headers are client-controlled; throttle on the socket peer.
    let peer = req
        .peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    limiter.check_rate_limit(peer)?;

    let outcome = auth::login(&ctx, &form.email, &form.password, &origin).await?;
    let tokens = outcome.tokens;

    Ok(HttpResponse::Ok().json(LoginResponse {
        user: UserSummary {
            id: outcome.principal.id.to_string(),
            email: outcome.principal.email,
            name: outcome.principal.name,
            role: outcome.principal.role,
        },
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: TOKEN_TYPE,
        expires_in: tokens.expires_in,
    }))
}

/// POST /auth/refresh
///
/// Exchanges a refresh token for a new pair. The presented token is spent
/// whether or not the caller receives the response.
///
/// # Errors
/// - 401: TOKEN_REUSED, TOKEN_REVOKED, TOKEN_NOT_FOUND or REFRESH_TOKEN_EXPIRED
/// - 403: Associated account is inactive
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    ctx: web::Data<AuthContext>,
) -> Result<HttpResponse, AppError> {
    let tokens = auth::redeem(&ctx, &form.refresh_token, &request_origin(&req)).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::from(tokens)))
}

/// POST /auth/logout
///
/// Requires a bearer credential. With a `refreshToken` only that session
/// ends; without one, or with `allDevices`, every session does.
pub async fn logout(
    req: HttpRequest,
    principal: web::ReqData<Principal>,
    form: Option<web::Json<LogoutRequest>>,
    ctx: web::Data<AuthContext>,
) -> Result<HttpResponse, AppError> {
    let form = form.map(web::Json::into_inner).unwrap_or_default();

    auth::logout(
        &ctx,
        &principal,
        form.refresh_token.as_deref(),
        form.all_devices,
        &request_origin(&req),
    )
    .await
    .map_err(|e| {
        ErrorContext::new("logout")
            .with_principal_id(principal.id)
            .log_error(&e);
        e
    })?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Logged out",
    }))
}

/// POST /auth/forgot-password
///
/// Always 200 with the same body, whether or not the account exists.
/// The recovery itself runs in the background.
pub async fn forgot_password(
    req: HttpRequest,
    form: web::Json<ForgotPasswordRequest>,
    ctx: web::Data<AuthContext>,
) -> HttpResponse {
    let origin = request_origin(&req);
    let _ = auth::spawn_request_reset(ctx.get_ref().clone(), form.into_inner().email, origin.ip);

    HttpResponse::Ok().json(MessageResponse {
        message: RESET_REQUESTED_MESSAGE,
    })
}

/// POST /auth/reset-password
///
/// # Errors
/// - 400: RECOVERY_TOKEN_INVALID, or the new password fails the strength policy
pub async fn reset_password(
    req: HttpRequest,
    form: web::Json<ResetPasswordRequest>,
    ctx: web::Data<AuthContext>,
) -> Result<HttpResponse, AppError> {
    auth::reset_password(&ctx, &form.token, &form.new_password, &request_origin(&req)).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Password has been reset",
    }))
}

/// GET /auth/me
///
/// The verified principal, straight from the access credential.
pub async fn me(principal: web::ReqData<Principal>) -> HttpResponse {
    HttpResponse::Ok().json(PrincipalResponse {
        id: principal.id.to_string(),
        email: principal.email.clone(),
        role: principal.role.to_string(),
        permissions: principal.permissions.codes(),
    })
}
