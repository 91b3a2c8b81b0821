//! Where credentials travel on the wire.
//!
//! GET requests carry both tokens as cookies. Every other method carries
//! the access token as `Authorization: Bearer <token>` and the refresh
//! token in `X-Refresh-Token`. The two sources are never mixed.

use axum::http::{HeaderMap, Method, header};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};

/// Header carrying the refresh token on non-GET requests.
pub const REFRESH_HEADER_NAME: &str = "x-refresh-token";

const BEARER_PREFIX: &str = "Bearer ";

/// Raw credential strings found on a request. Nothing here is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Pull both credentials from the location the method dictates.
pub fn extract(method: &Method, headers: &HeaderMap) -> Credentials {
    if method == Method::GET {
        Credentials {
            access: non_empty(get_cookie(headers, ACCESS_COOKIE_NAME)),
            refresh: non_empty(get_cookie(headers, REFRESH_COOKIE_NAME)),
        }
    } else {
        Credentials {
            access: non_empty(bearer_token(headers)),
            refresh: non_empty(header_text(headers, REFRESH_HEADER_NAME)),
        }
    }
}

/// The auth scheme compares case-insensitively, so `bearer` works too.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_text(headers, header::AUTHORIZATION.as_str())?;
    let scheme = value.get(..BEARER_PREFIX.len())?;
    scheme
        .eq_ignore_ascii_case(BEARER_PREFIX)
        .then(|| &value[BEARER_PREFIX.len()..])
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
