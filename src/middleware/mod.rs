/// Middleware module
///
/// Bearer-credential verification for protected scopes.

mod jwt_middleware;

pub use jwt_middleware::{bearer_token, JwtMiddleware};
