mod admin;
mod auth;
mod health_check;

pub use admin::{revoke_sessions, REVOKE_SESSIONS_PERMISSION};
pub use auth::{forgot_password, login, logout, me, refresh, request_origin, reset_password};
pub use health_check::health_check;
