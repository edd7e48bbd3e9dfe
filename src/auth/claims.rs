/// JWT Claims structure
///
/// The access credential payload. Role and permissions are a snapshot taken
/// at issuance; `ver` records the principal's permission version at that
/// moment so privilege changes can be detected before natural expiry.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AccessTokenError, AppError};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (principal ID as UUID string)
    pub sub: String,
    /// Principal email
    pub email: String,
    /// Role name at issuance
    pub role: String,
    /// Permission codes at issuance
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Permission version at issuance
    #[serde(default)]
    pub ver: i32,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims expiring `expiry_seconds` from now
    pub fn new(
        principal_id: Uuid,
        email: String,
        role: String,
        permissions: Vec<String>,
        ver: i32,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: principal_id.to_string(),
            email,
            role,
            permissions,
            ver,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract principal ID from claims
    ///
    /// # Errors
    /// A signed token whose subject is not a UUID is reported as malformed.
    pub fn principal_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AccessTokenError::Malformed.into())
    }
}
