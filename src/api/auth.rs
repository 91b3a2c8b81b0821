//! Session API endpoints.
//!
//! - POST `/login` - Exchange member id and password for a token pair
//! - POST `/logout` - Drop the caller's refresh records and clear cookies
//! - POST `/signup` - Register a new member
//! - POST `/check-id` - Check whether a member id is free
//! - GET `/me` - Identity of the caller, if any

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{
    ACCESS_COOKIE_NAME, AnyRole, Auth, OptionalAuth, REFRESH_COOKIE_NAME, clear_cookie,
    credential_cookie,
};
use crate::db::Role;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_signup};
use crate::session::SessionIssuer;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionIssuer,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: AuthState) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let signup_router = Router::new()
        .route("/signup", post(signup))
        .route("/check-id", post(check_id))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_signup,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(signup_router)
        .merge(session_router)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    member_id: String,
    password: String,
}

#[derive(Deserialize)]
struct CheckIdRequest {
    member_id: String,
}

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Serialize)]
struct SignupResponse {
    member_id: String,
}

#[derive(Serialize)]
struct CheckIdResponse {
    available: bool,
}

#[derive(Serialize)]
struct MeResponse {
    member_id: Option<String>,
    role: Option<Role>,
}

/// Verify credentials, set both cookies and return the tokens in the body.
async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .login(payload.member_id.trim(), &payload.password)
        .await?;

    let access_cookie = credential_cookie(ACCESS_COOKIE_NAME, &pair.access_token, pair.access_max_age);
    let refresh_cookie =
        credential_cookie(REFRESH_COOKIE_NAME, &pair.refresh_token, pair.refresh_max_age);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// Logout - drop every refresh record of the caller and clear both cookies.
async fn logout(
    State(state): State<AuthState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.logout(&auth.identity.member_id).await?;

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME)),
            (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME)),
        ]),
        Json(serde_json::json!({ "success": true })),
    ))
}

async fn signup(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member_id = payload.member_id.trim();
    state.sessions.sign_up(member_id, &payload.password).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            member_id: member_id.to_string(),
        }),
    ))
}

async fn check_id(
    State(state): State<AuthState>,
    Json(payload): Json<CheckIdRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state
        .sessions
        .is_identifier_available(payload.member_id.trim())
        .await?
    {
        return Err(ApiError::conflict("Member ID is already taken"));
    }

    Ok(Json(CheckIdResponse { available: true }))
}

async fn me(OptionalAuth(identity): OptionalAuth) -> Json<MeResponse> {
    Json(match identity {
        Some(identity) => MeResponse {
            member_id: Some(identity.member_id),
            role: Some(identity.role),
        },
        None => MeResponse {
            member_id: None,
            role: None,
        },
    })
}
