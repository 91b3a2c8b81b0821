//! Rate limiting for credential-accepting endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and sign-up spam.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Default login attempts allowed per IP per minute.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

/// Default sign-up and id-check requests allowed per IP per minute.
pub const DEFAULT_SIGNUP_PER_MINUTE: u32 = 5;

/// Bucket shared by requests whose client IP is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for the auth endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub login: Arc<IpLimiter>,
    pub signup: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Create limiters allowing the given number of requests per minute per IP.
    /// Zero is treated as one.
    pub fn new(login_per_minute: u32, signup_per_minute: u32) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(per_minute(login_per_minute))),
            signup: Arc::new(RateLimiter::keyed(per_minute(signup_per_minute))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PER_MINUTE, DEFAULT_SIGNUP_PER_MINUTE)
    }
}

fn per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
}

fn check(limiter: &IpLimiter, request: &Request, message: &'static str) -> Result<(), Response> {
    let ip = extract_client_ip(request.extensions()).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    limiter.check_key(&ip).map_err(|_| {
        tracing::warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        (StatusCode::TOO_MANY_REQUESTS, message).into_response()
    })
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.login,
        &request,
        "Too many login attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting sign-up.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(
        &config.signup,
        &request,
        "Too many signup attempts. Please wait before trying again.",
    ) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
