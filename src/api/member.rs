//! Member API endpoints.

use axum::{Json, Router, routing::get};

use crate::auth::{Auth, Identity, MemberOrAdmin};

pub fn router() -> Router {
    Router::new().route("/whoami", get(whoami))
}

/// Identity the request was attributed to.
async fn whoami(auth: Auth<MemberOrAdmin>) -> Json<Identity> {
    Json(auth.identity)
}
