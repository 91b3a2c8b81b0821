//! Shared authentication backend handed to the gate and the session issuer.

use std::sync::Arc;
use std::time::Duration;

use super::store::CredentialStore;
use crate::jwt::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, TokenCodec};

/// Default bound on a single refresh-record lookup.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Token lifetimes and lookup bounds. Loaded once at startup.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub store_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Everything the gate needs. Cheap to clone; all fields are shared read-only.
#[derive(Clone)]
pub struct AuthBackend {
    pub codec: Arc<TokenCodec>,
    pub store: Arc<dyn CredentialStore>,
    pub settings: Arc<AuthSettings>,
}

impl AuthBackend {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn CredentialStore>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            codec,
            store,
            settings: Arc::new(settings),
        }
    }
}
