/// Authentication module
///
/// Credential issuance, refresh rotation, password recovery, access
/// verification and permission resolution.

pub mod claims;
pub mod context;
pub mod issuer;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod recovery;
pub mod recovery_token;
pub mod refresh_token;
pub mod rotation;

pub use claims::Claims;
pub use context::AuthContext;
pub use issuer::{login, IssuedTokens, LoginOutcome};
pub use jwt::{generate_access_token, validate_access_token};
pub use password::{hash_password, verify_password};
pub use principal::{authorize, PermissionSet, Principal, Role};
pub use recovery::{request_reset, reset_password, spawn_request_reset};
pub use rotation::{logout, redeem, revoke_all};
