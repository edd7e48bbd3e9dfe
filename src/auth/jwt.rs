/// Access credential signing and verification
///
/// Verification is stateless: signature, issuer and expiry only. Every
/// rejection is classified into an `AccessTokenError` so callers can decide
/// between refreshing and re-authenticating.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;

use crate::auth::claims::Claims;
use crate::auth::principal::Principal;
use crate::configuration::JwtSettings;
use crate::error::{AccessTokenError, AppError};

/// Sign an access token carrying the principal's role and permission snapshot
///
/// # Errors
/// Returns error if token generation fails
pub fn generate_access_token(principal: &Principal, config: &JwtSettings) -> Result<String, AppError> {
    let claims = Claims::new(
        principal.id,
        principal.email.clone(),
        principal.role.as_str().to_string(),
        principal.permissions.codes(),
        principal.permissions_version,
        config.access_token_expiry,
        config.issuer.clone(),
    );

    sign_claims(&claims, config)
}

pub(crate) fn sign_claims(claims: &Claims, config: &JwtSettings) -> Result<String, AppError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from an access token
///
/// # Errors
/// - `Expired`: well-signed token past its `exp`
/// - `InvalidSignature`: signature mismatch or a foreign issuer
/// - `Malformed`: anything that does not decode as one of our tokens
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AccessTokenError> {
    if token.trim().is_empty() {
        return Err(AccessTokenError::Missing);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    // `exp` is exact: no clock-skew grace.
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        let reason = classify(e.kind());
        tracing::debug!(error = %e, reason = ?reason, "Access token rejected");
        reason
    })
}

fn classify(kind: &ErrorKind) -> AccessTokenError {
    match kind {
        ErrorKind::ExpiredSignature => AccessTokenError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidIssuer | ErrorKind::InvalidAlgorithm => {
            AccessTokenError::InvalidSignature
        }
        _ => AccessTokenError::Malformed,
    }
}
