mod admin;
mod auth;
mod error;
mod member;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionIssuer;

pub use error::{ApiError, ResultExt};

/// Create the API router.
///
/// Routes are only reachable through the authentication gate, which the
/// caller layers on top.
pub fn create_api_router(
    db: Database,
    sessions: SessionIssuer,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthState {
        sessions,
        rate_limit_config,
    };

    let admin_state = admin::AdminState { db };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/member", member::router())
        .nest("/admin", admin::router(admin_state))
}
