pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod cors;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use auth::{AuthBackend, AuthSettings, authentication_gate};
use axum::{Router, middleware};
use db::Database;
use jwt::{JwtError, TokenCodec};
use rate_limit::RateLimitConfig;
use session::SessionIssuer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Token lifetimes and store lookup bound
    pub auth: AuthSettings,
    /// Login attempts allowed per client IP per minute
    pub login_per_minute: u32,
    /// Sign-up requests allowed per client IP per minute
    pub signup_per_minute: u32,
    /// Browser origins allowed to call the API cross-origin
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Configuration with default lifetimes and rate limits.
    pub fn new(db: Database, jwt_secret: Vec<u8>) -> Self {
        Self {
            db,
            jwt_secret,
            auth: AuthSettings::default(),
            login_per_minute: rate_limit::DEFAULT_LOGIN_PER_MINUTE,
            signup_per_minute: rate_limit::DEFAULT_SIGNUP_PER_MINUTE,
            cors_origins: vec![cors::DEFAULT_ALLOWED_ORIGIN.to_string()],
        }
    }
}

/// Build the session issuer backed by the configured database.
pub fn session_issuer(config: &ServerConfig) -> Result<SessionIssuer, JwtError> {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret)?);
    let db = Arc::new(config.db.clone());
    Ok(SessionIssuer::new(
        codec,
        db.clone(),
        db,
        Arc::new(config.auth.clone()),
    ))
}

/// Create the application router with the given configuration.
/// Fails only when the signing secret is unusable.
pub fn create_app(config: &ServerConfig) -> Result<Router, JwtError> {
    let codec = Arc::new(TokenCodec::new(&config.jwt_secret)?);
    let settings = Arc::new(config.auth.clone());
    let db = Arc::new(config.db.clone());

    let backend = AuthBackend {
        codec: codec.clone(),
        store: db.clone(),
        settings: settings.clone(),
    };
    let sessions = SessionIssuer::new(codec, db.clone(), db, settings);
    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.login_per_minute,
        config.signup_per_minute,
    ));

    // CORS sits outside the gate so preflights are answered before it runs
    Ok(
        create_api_router(config.db.clone(), sessions, rate_limit_config)
            .layer(middleware::from_fn_with_state(backend, authentication_gate))
            .layer(cors::cors_layer(&config.cors_origins)),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    info!(
        address = %listener.local_addr()?,
        access_ttl_secs = config.auth.access_ttl.as_secs(),
        refresh_ttl_secs = config.auth.refresh_ttl.as_secs(),
        "Listening"
    );
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
