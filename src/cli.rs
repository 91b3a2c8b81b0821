//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::AuthSettings;
use crate::db::{Database, Role};
use crate::jwt::MIN_SECRET_LENGTH;
use crate::session::{SessionError, SessionIssuer};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokengate",
    about = "Stateless dual-token authentication gateway"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokengate.db")]
    pub database: String,

    /// Path to file containing the signing secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TTL_SECS", default_value = "900")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TTL_SECS", default_value = "2592000")]
    pub refresh_ttl_secs: u64,

    /// Upper bound on a single refresh record lookup, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "2000")]
    pub store_timeout_ms: u64,

    /// Browser origin allowed to call the API cross-origin (repeatable or comma-separated)
    #[arg(
        long = "cors-origin",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = crate::cors::DEFAULT_ALLOWED_ORIGIN
    )]
    pub cors_origins: Vec<String>,

    /// Create an admin member with this id on startup (password from ADMIN_PASSWORD)
    #[arg(long)]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_ttl: Duration::from_secs(self.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_ttl_secs),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the signing secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// Must be called before the async runtime or any other thread is started.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<Vec<u8>> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: main calls this before building the tokio runtime, so no
        // other thread exists that could read the environment concurrently.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    let key = decode_secret(&secret);
    if key.len() < MIN_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} bytes. Use a longer secret",
            MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(key)
}

/// Interpret a configured secret: standard base64 when it decodes, raw bytes otherwise.
pub fn decode_secret(secret: &str) -> Vec<u8> {
    let secret = secret.trim();
    STANDARD
        .decode(secret)
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}

/// Read ADMIN_PASSWORD for --create-admin and remove it from the environment.
/// Returns None and logs an error if it is not set.
///
/// Must be called before the async runtime or any other thread is started.
pub fn take_admin_password() -> Option<String> {
    let Ok(password) = std::env::var("ADMIN_PASSWORD") else {
        error!("ADMIN_PASSWORD environment variable is required with --create-admin");
        return None;
    };
    // SAFETY: main calls this before building the tokio runtime, so no
    // other thread exists that could read the environment concurrently.
    unsafe { std::env::remove_var("ADMIN_PASSWORD") };
    Some(password)
}

/// Handle the --create-admin flag: register an admin with the given password.
/// An already existing member with that id is promoted instead.
pub async fn handle_create_admin(
    db: &Database,
    sessions: &SessionIssuer,
    member_id: &str,
    password: &str,
) {
    match sessions.register(member_id, password, Role::Admin).await {
        Ok(()) => {
            println!();
            println!("Admin member created: {}", member_id);
            println!();
        }
        Err(SessionError::Conflict) => match db.members().set_role(member_id, Role::Admin).await {
            Ok(_) => info!(member_id = %member_id, "Existing member promoted to admin"),
            Err(e) => {
                error!(error = %e, "Failed to promote existing member");
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Failed to create admin member");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: Vec<u8>) -> ServerConfig {
    ServerConfig {
        auth: args.auth_settings(),
        cors_origins: args.cors_origins.clone(),
        ..ServerConfig::new(db, jwt_secret)
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
