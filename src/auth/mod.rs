//! Stateless dual-token authentication with role-based access control.
//!
//! Access tokens are short-lived and verified by signature alone. Refresh
//! tokens are long-lived and must also be on record in the credential store.
//! The gate middleware resolves an identity for every request and renews
//! the access token when only the refresh token is still good. Extractors
//! then enforce per-route role constraints.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod ip;
mod state;
mod store;
mod transport;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, credential_cookie, get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, MemberOrAdmin, OptionalAuth, RoleConstraint};
pub use gate::{CredentialState, GateOutcome, authentication_gate, evaluate};
pub use ip::extract_client_ip;
pub use state::{AuthBackend, AuthSettings, DEFAULT_STORE_TIMEOUT};
pub use store::{CredentialStore, MemberDirectory, StoreError};
pub use transport::{Credentials, REFRESH_HEADER_NAME, extract as extract_credentials};
pub use types::{CurrentIdentity, Identity};
