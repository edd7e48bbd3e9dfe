/// Edge protection for the credential endpoints
/// Features:
/// - Per-IP login throttling (credential stuffing protection)
/// - Security headers, including `Cache-Control: no-store` on credential responses

use std::net::IpAddr;
use std::num::NonZeroU32;

use actix_web::middleware::DefaultHeaders;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use crate::configuration::RateLimitSettings;
use crate::error::AppError;

/// Tracked addresses above which idle buckets are dropped.
const PRUNE_THRESHOLD: usize = 10_000;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Login throttle: one token bucket per peer address
pub struct RateLimiterManager {
    requests_per_minute: u32,
    limiter: KeyedLimiter,
}

impl RateLimiterManager {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let per_minute =
            NonZeroU32::new(settings.login_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            requests_per_minute: per_minute.get(),
            limiter: RateLimiter::keyed(Quota::per_minute(per_minute)),
        }
    }

    /// Take one token for `ip`, or fail with `RateLimited`.
    ///
    /// `ip` must be the transport peer, never a forwarded header value.
    pub fn check_rate_limit(&self, ip: IpAddr) -> Result<(), AppError> {
        let result = self.limiter.check_key(&ip);

        if self.limiter.len() > PRUNE_THRESHOLD {
            self.limiter.retain_recent();
            self.limiter.shrink_to_fit();
        }

        result.map_err(|_| {
            tracing::warn!(ip = %ip, limit = self.requests_per_minute, "Login rate limit exceeded");
            AppError::RateLimited
        })
    }
}

/// Security headers for HTTP responses
pub struct SecurityHeaders;

impl SecurityHeaders {
    pub fn get_headers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
            ("Referrer-Policy", "no-referrer"),
            ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
            // Responses carry credentials; nothing may be cached.
            ("Cache-Control", "no-store"),
        ]
    }

    /// The headers above as an actix middleware.
    pub fn middleware() -> DefaultHeaders {
        Self::get_headers()
            .into_iter()
            .fold(DefaultHeaders::new(), |headers, pair| headers.add(pair))
    }
}
