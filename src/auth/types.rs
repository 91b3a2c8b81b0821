//! Per-request identity types.

use serde::Serialize;

use crate::db::Role;
use crate::jwt::Credential;

/// Who a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Member identifier (token subject)
    pub member_id: String,
    pub role: Role,
}

impl From<&Credential> for Identity {
    fn from(credential: &Credential) -> Self {
        Self {
            member_id: credential.subject.clone(),
            role: credential.role,
        }
    }
}

/// The gate's verdict for one request, stored in the request extensions.
/// `None` means the request proceeds unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct CurrentIdentity(pub Option<Identity>);
