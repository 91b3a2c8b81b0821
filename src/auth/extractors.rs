//! Axum extractors for authorization.
//!
//! Extractors never look at tokens. They read the identity the gate left
//! in the request extensions and check it against a role constraint.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::types::{CurrentIdentity, Identity};
use crate::db::Role;

/// A set of roles allowed through an [`Auth`] extractor.
pub trait RoleConstraint: Send + Sync {
    fn allows(role: Role) -> bool;
}

/// Any authenticated identity.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_: Role) -> bool {
        true
    }
}

/// `ROLE_MEMBER` or `ROLE_ADMIN`.
pub struct MemberOrAdmin;

impl RoleConstraint for MemberOrAdmin {
    fn allows(role: Role) -> bool {
        matches!(role, Role::Member | Role::Admin)
    }
}

/// `ROLE_ADMIN` only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: Role) -> bool {
        role == Role::Admin
    }
}

fn current_identity(parts: &Parts) -> Option<&Identity> {
    parts
        .extensions
        .get::<CurrentIdentity>()
        .and_then(|current| current.0.as_ref())
}

/// Requires an identity whose role satisfies `R`.
/// 401 without an identity, 403 with one the constraint refuses.
pub struct Auth<R: RoleConstraint = AnyRole> {
    pub identity: Identity,
    _role: PhantomData<R>,
}

impl<R: RoleConstraint> Auth<R> {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            _role: PhantomData,
        }
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = current_identity(parts)
            .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        if !R::allows(identity.role) {
            tracing::debug!(
                member_id = %identity.member_id,
                role = %identity.role,
                "Role not permitted for route"
            );
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth::new(identity.clone()))
    }
}

/// Optional identity - never fails.
/// For routes that behave differently for anonymous callers.
pub struct OptionalAuth(pub Option<Identity>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(current_identity(parts).cloned()))
    }
}
