#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use std::time::Duration;
use tokengate::{
    ServerConfig, create_app,
    db::{Database, Role},
    jwt::{TokenCodec, unix_now},
    session::{SessionIssuer, TokenPair},
};
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"integration-test-secret-long-enough!";
pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
    pub sessions: SessionIssuer,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let config = ServerConfig {
            login_per_minute: 1000,
            signup_per_minute: 1000,
            ..ServerConfig::new(db.clone(), TEST_SECRET.to_vec())
        };
        let app = create_app(&config).expect("Failed to build app");
        let sessions = tokengate::session_issuer(&config).expect("Failed to build issuer");

        Self {
            app,
            db,
            codec: TokenCodec::new(TEST_SECRET).unwrap(),
            sessions,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Register `member_id` with the given role and log in.
    pub async fn member(&self, member_id: &str, role: Role) -> TokenPair {
        self.sessions
            .register(member_id, PASSWORD, role)
            .await
            .expect("Failed to register member");
        self.sessions
            .login(member_id, PASSWORD)
            .await
            .expect("Failed to log in")
    }

    /// An access token for `member_id` that expired an hour ago.
    pub fn expired_access(&self, member_id: &str, role: Role) -> String {
        let issued = unix_now().unwrap() - 3600;
        self.codec
            .encode_at(member_id, role, Duration::from_secs(60), issued)
            .unwrap()
            .token
    }
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

pub fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("POST").uri(uri)
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(value.to_string())
}

pub fn cookies(access: &str, refresh: &str) -> String {
    format!("accessToken={}; refreshToken={}", access, refresh)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a freshly set (not cleared) cookie
pub fn new_cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .filter(|c| c.starts_with(&prefix) && !c.contains("Max-Age=0"))
        .find_map(|c| c[prefix.len()..].split(';').next().map(str::to_string))
}

/// The last `Set-Cookie` for `name`, which is the one a browser keeps
pub fn last_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .rev()
        .find(|c| c.starts_with(&prefix))
        .map(String::as_str)
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    let prefix = format!("{}=;", name);
    cookies
        .iter()
        .any(|c| c.starts_with(&prefix) && c.contains("Max-Age=0"))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
