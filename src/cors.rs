//! Cross-origin policy for browser front ends on other origins.
//!
//! Those clients copy the token cookies into `Authorization` and
//! `X-Refresh-Token` on non-GET requests, so both headers must pass
//! preflight and credentials must be allowed.

use axum::http::{
    HeaderName, HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::auth::REFRESH_HEADER_NAME;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// How long browsers may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Build the CORS layer for the given origins. Origins that are not valid
/// header values are skipped with a warning.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let refresh_header = HeaderName::from_static(REFRESH_HEADER_NAME);

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, refresh_header.clone()])
        .expose_headers([refresh_header])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE)
}
