//! Admin API endpoints.
//!
//! All endpoints require admin role.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};

use super::error::{ApiError, ResultExt};
use crate::auth::{AdminOnly, Auth};
use crate::db::Database;

/// State for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/members", get(list_members))
        .with_state(state)
}

/// List all members.
async fn list_members(
    State(state): State<AdminState>,
    _auth: Auth<AdminOnly>,
) -> Result<impl IntoResponse, ApiError> {
    let members = state
        .db
        .members()
        .list()
        .await
        .db_err("Failed to list members")?;

    Ok(Json(members))
}
