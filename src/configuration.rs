use secrecy::{ExposeSecret, Secret};

use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub recovery: RecoverySettings,
    pub email_client: EmailClientSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Settings {
    /// Reject values that deserialize fine but would break issuance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.jwt.secret.expose_secret();
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "jwt.secret must be at least 32 bytes".to_string(),
            ));
        }
        if self.jwt.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if self.jwt.refresh_token_expiry <= self.jwt.access_token_expiry {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must outlive the access token".to_string(),
            ));
        }
        if self.recovery.token_ttl_minutes <= 0 {
            return Err(ConfigError::InvalidValue(
                "recovery.token_ttl_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port,
            self.database_name
        )
    }
}

/// Credential issuance settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: Secret<String>,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds, 86400 = 24 hours
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds, 604800 = 7 days
    pub issuer: String,
    /// Revoke every descendant of a refresh token that is presented twice.
    #[serde(default = "default_true")]
    pub revoke_lineage_on_reuse: bool,
    /// Compare the `ver` claim with the stored permission version on
    /// permission-gated routes.
    #[serde(default = "default_true")]
    pub enforce_permission_version: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct RecoverySettings {
    #[serde(default = "default_recovery_ttl")]
    pub token_ttl_minutes: i64,
    #[serde(default = "default_reset_url")]
    pub reset_url: String,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            token_ttl_minutes: default_recovery_ttl(),
            reset_url: default_reset_url(),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    #[serde(default = "default_email_timeout")]
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_milliseconds)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct RateLimitSettings {
    pub login_requests_per_minute: u32,
    pub max_content_length: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_requests_per_minute: 10,
            max_content_length: 4096,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_access_token_expiry() -> i64 {
    24 * 60 * 60
}

fn default_refresh_token_expiry() -> i64 {
    7 * 24 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_recovery_ttl() -> i64 {
    60
}

fn default_reset_url() -> String {
    "http://127.0.0.1:8080/reset-password".to_string()
}

fn default_email_timeout() -> u64 {
    10_000
}

/// Load settings from `configuration.{yaml,json,toml}` and `APP__*`
/// environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
