/// Verified principals and the permission resolver
///
/// A `Principal` is built only from verified claims (or from a freshly
/// loaded store record at issuance). Authorization is answered by explicit
/// capability functions rather than by probing request fields.

use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::context::AuthContext;
use crate::error::{AccessTokenError, AppError, AuthError};

const ADMINISTRATOR_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Administrator,
    Named(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Administrator => ADMINISTRATOR_ROLE,
            Role::Named(name) => name,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Role::Administrator)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case(ADMINISTRATOR_ROLE) {
            Role::Administrator
        } else {
            Role::Named(value.to_string())
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission codes snapshotted for a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(codes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    /// Sorted, deduplicated codes.
    pub fn codes(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub permissions: PermissionSet,
    pub permissions_version: i32,
}

impl Principal {
    pub fn from_claims(claims: &Claims) -> Result<Self, AppError> {
        Ok(Self {
            id: claims.principal_id()?,
            email: claims.email.clone(),
            role: Role::from(claims.role.as_str()),
            permissions: PermissionSet::from_codes(claims.permissions.iter().cloned()),
            permissions_version: claims.ver,
        })
    }

    pub fn is_administrator(&self) -> bool {
        self.role.is_administrator()
    }

    /// Administrators hold every permission.
    pub fn can(&self, permission: &str) -> bool {
        self.is_administrator() || self.permissions.contains(permission)
    }

    /// Stateless resolver check against the snapshot.
    pub fn require(&self, permission: &str) -> Result<(), AuthError> {
        if self.can(permission) {
            Ok(())
        } else {
            tracing::warn!(
                principal_id = %self.id,
                role = %self.role,
                permission = permission,
                "Permission denied"
            );
            Err(AuthError::Forbidden)
        }
    }
}

/// Resolver check plus, when enabled, a freshness check of the snapshot.
///
/// A snapshot taken under an older permission version, or for a principal
/// that has since been deactivated or removed, is reported as an expired
/// access credential so the client refreshes and picks up current rights.
pub async fn authorize(
    ctx: &AuthContext,
    principal: &Principal,
    permission: &str,
) -> Result<(), AppError> {
    if ctx.jwt.enforce_permission_version {
        let current = ctx.principals.find_by_id(principal.id).await?;
        let fresh = matches!(
            &current,
            Some(record) if record.is_active && record.permissions_version == principal.permissions_version
        );
        if !fresh {
            tracing::info!(
                principal_id = %principal.id,
                token_version = principal.permissions_version,
                "Stale permission snapshot"
            );
            return Err(AccessTokenError::Expired.into());
        }
    }

    principal.require(permission)?;
    Ok(())
}
