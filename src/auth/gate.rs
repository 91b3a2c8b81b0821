//! Per-request authentication gate.
//!
//! Runs once per request before any handler. It decides who the request is
//! attributed to and, when only the refresh token is usable, mints a new
//! access token and sets it on the response as a cookie. The renewal cookie
//! goes ahead of any `Set-Cookie` the handler wrote, so a handler that logs
//! in or out has the last word on the access cookie.
//!
//! The gate never rejects. Failures of any kind leave the request
//! unauthenticated and it is up to the route extractors to refuse it.
//! A valid access token is only honoured while a refresh record is on file
//! for the refresh token sent alongside it; since access tokens cannot be
//! revoked, this is how logout takes effect before the access token expires.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, info, warn};

use super::cookie::{ACCESS_COOKIE_NAME, credential_cookie};
use super::state::AuthBackend;
use super::store::StoreError;
use super::transport::{self, Credentials};
use super::types::{CurrentIdentity, Identity};
use crate::jwt::IssuedToken;

/// Which combination of credentials a request presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NoCredentials,
    AccessValid,
    AccessValidRefreshInvalid,
    AccessInvalidRefreshValid,
    AccessInvalidRefreshInvalid,
}

/// What the gate decided for one request.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub state: CredentialState,
    pub identity: Option<Identity>,
    /// Freshly minted access token, present only on renewal
    pub renewed: Option<IssuedToken>,
}

impl GateOutcome {
    fn anonymous(state: CredentialState) -> Self {
        Self {
            state,
            identity: None,
            renewed: None,
        }
    }
}

/// Decide the outcome for a set of extracted credentials.
pub async fn evaluate(backend: &AuthBackend, credentials: &Credentials) -> GateOutcome {
    let access = credentials
        .access
        .as_deref()
        .map(|token| backend.codec.decode(token));

    match access {
        Some(Ok(credential)) => {
            match check_refresh_record(backend, credentials.refresh.as_deref()).await {
                Ok(()) => {
                    debug!(member_id = %credential.subject, "Authenticated by access token");
                    GateOutcome {
                        state: CredentialState::AccessValid,
                        identity: Some(Identity::from(&credential)),
                        renewed: None,
                    }
                }
                Err(e) => {
                    warn!(
                        member_id = %credential.subject,
                        reason = %e,
                        "Access token valid but refresh record is not; proceeding unauthenticated"
                    );
                    GateOutcome::anonymous(CredentialState::AccessValidRefreshInvalid)
                }
            }
        }
        access => {
            if let Some(Err(e)) = access {
                debug!(reason = e.as_str(), "Access token rejected");
            }

            let Some(refresh_token) = credentials.refresh.as_deref() else {
                return if credentials.access.is_none() {
                    debug!("No credentials presented");
                    GateOutcome::anonymous(CredentialState::NoCredentials)
                } else {
                    GateOutcome::anonymous(CredentialState::AccessInvalidRefreshInvalid)
                };
            };

            renew(backend, refresh_token).await
        }
    }
}

/// Access token unusable: try to mint a new one from the refresh token.
async fn renew(backend: &AuthBackend, refresh_token: &str) -> GateOutcome {
    let refresh = match backend.codec.decode(refresh_token) {
        Ok(credential) => credential,
        Err(e) => {
            debug!(reason = e.as_str(), "Refresh token rejected");
            return GateOutcome::anonymous(CredentialState::AccessInvalidRefreshInvalid);
        }
    };

    if let Err(e) = check_refresh_record(backend, Some(refresh_token)).await {
        warn!(
            member_id = %refresh.subject,
            reason = %e,
            "Refresh token is not on record; renewal refused"
        );
        return GateOutcome::anonymous(CredentialState::AccessInvalidRefreshInvalid);
    }

    match backend
        .codec
        .encode(&refresh.subject, refresh.role, backend.settings.access_ttl)
    {
        Ok(issued) => {
            info!(member_id = %refresh.subject, "Access token renewed");
            GateOutcome {
                state: CredentialState::AccessInvalidRefreshValid,
                identity: Some(Identity::from(&refresh)),
                renewed: Some(issued),
            }
        }
        Err(e) => {
            error!(member_id = %refresh.subject, error = %e, "Failed to mint access token");
            GateOutcome::anonymous(CredentialState::AccessInvalidRefreshValid)
        }
    }
}

/// Ask the store whether `token` is on record, bounded by the store timeout.
/// An absent token never reaches the store.
async fn check_refresh_record(backend: &AuthBackend, token: Option<&str>) -> Result<(), StoreError> {
    let token = token.ok_or(StoreError::RecordNotFound)?;

    match tokio::time::timeout(backend.settings.store_timeout, backend.store.validate(token)).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(StoreError::RecordNotFound),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(StoreError::Unavailable("lookup timed out".into())),
    }
}

/// Middleware: attach the request's identity and, on renewal, the new access cookie.
pub async fn authentication_gate(
    State(backend): State<AuthBackend>,
    mut request: Request,
    next: Next,
) -> Response {
    let credentials = transport::extract(request.method(), request.headers());
    let outcome = evaluate(&backend, &credentials).await;

    request
        .extensions_mut()
        .insert(CurrentIdentity(outcome.identity));

    let mut response = next.run(request).await;

    if let Some(issued) = outcome.renewed {
        let cookie = credential_cookie(ACCESS_COOKIE_NAME, &issued.token, issued.duration);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => prepend_set_cookie(response.headers_mut(), value),
            Err(e) => error!(error = %e, "Renewed access cookie is not a valid header"),
        }
    }

    response
}

/// Put `value` first among the `Set-Cookie` headers. Clients keep the last
/// cookie of a given name, so cookies set by the handler override it.
fn prepend_set_cookie(headers: &mut HeaderMap, value: HeaderValue) {
    let handler_cookies: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
    headers.insert(SET_COOKIE, value);
    for cookie in handler_cookies {
        headers.append(SET_COOKIE, cookie);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::AuthSettings;
    use crate::auth::store::CredentialStore;
    use crate::db::Role;
    use crate::jwt::TokenCodec;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SECRET: &[u8] = b"gate-test-secret-that-is-long-enough";

    /// Answers every lookup the same way and counts calls.
    struct FixedStore {
        answer: Result<bool, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedStore {
        fn new(answer: Result<bool, ()>) -> Self {
            Self {
                answer,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialStore for FixedStore {
        async fn validate(&self, _token: &str) -> Result<bool, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer
                .map_err(|_| StoreError::Unavailable("connection refused".into()))
        }

        async fn insert(&self, _: &str, _: &str, _: u64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn invalidate(&self, _: &str) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn backend(store: Arc<FixedStore>) -> AuthBackend {
        AuthBackend::new(
            Arc::new(TokenCodec::new(SECRET).unwrap()),
            store,
            AuthSettings {
                store_timeout: Duration::from_millis(50),
                ..AuthSettings::default()
            },
        )
    }

    fn token(backend: &AuthBackend, subject: &str, role: Role) -> String {
        backend
            .codec
            .encode(subject, role, Duration::from_secs(60))
            .unwrap()
            .token
    }

    fn expired_token(backend: &AuthBackend, subject: &str) -> String {
        backend
            .codec
            .encode_at(subject, Role::Member, Duration::from_secs(60), 1_000)
            .unwrap()
            .token
    }

    fn creds(access: Option<&str>, refresh: Option<&str>) -> Credentials {
        Credentials {
            access: access.map(str::to_string),
            refresh: refresh.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_no_credentials() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store.clone());

        let outcome = evaluate(&backend, &creds(None, None)).await;

        assert_eq!(outcome.state, CredentialState::NoCredentials);
        assert!(outcome.identity.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_access_valid_with_recorded_refresh() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store.clone());
        let access = token(&backend, "alice", Role::Admin);
        let refresh = token(&backend, "alice", Role::Admin);

        let outcome = evaluate(&backend, &creds(Some(&access), Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessValid);
        assert_eq!(
            outcome.identity,
            Some(Identity {
                member_id: "alice".into(),
                role: Role::Admin
            })
        );
        assert!(outcome.renewed.is_none());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_access_valid_without_refresh_is_anonymous() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store.clone());
        let access = token(&backend, "alice", Role::Member);

        let outcome = evaluate(&backend, &creds(Some(&access), None)).await;

        assert_eq!(outcome.state, CredentialState::AccessValidRefreshInvalid);
        assert!(outcome.identity.is_none());
        // Absent refresh token never costs a store round trip
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_access_valid_with_revoked_refresh_is_anonymous() {
        let store = Arc::new(FixedStore::new(Ok(false)));
        let backend = backend(store);
        let access = token(&backend, "alice", Role::Member);
        let refresh = token(&backend, "alice", Role::Member);

        let outcome = evaluate(&backend, &creds(Some(&access), Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessValidRefreshInvalid);
        assert!(outcome.identity.is_none());
    }

    #[tokio::test]
    async fn test_expired_access_renews_from_refresh() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store);
        let access = expired_token(&backend, "alice");
        let refresh = token(&backend, "alice", Role::Admin);

        let outcome = evaluate(&backend, &creds(Some(&access), Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshValid);
        assert_eq!(
            outcome.identity,
            Some(Identity {
                member_id: "alice".into(),
                role: Role::Admin
            })
        );

        let renewed = outcome.renewed.expect("renewed token");
        assert_eq!(renewed.duration, backend.settings.access_ttl.as_secs());
        let credential = backend.codec.decode(&renewed.token).unwrap();
        assert_eq!(credential.subject, "alice");
        assert_eq!(credential.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_refresh_only_renews() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store);
        let refresh = token(&backend, "bob", Role::Member);

        let outcome = evaluate(&backend, &creds(None, Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshValid);
        assert!(outcome.renewed.is_some());
    }

    #[tokio::test]
    async fn test_unrecorded_refresh_is_refused() {
        let store = Arc::new(FixedStore::new(Ok(false)));
        let backend = backend(store);
        let refresh = token(&backend, "bob", Role::Member);

        let outcome = evaluate(&backend, &creds(None, Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshInvalid);
        assert!(outcome.identity.is_none());
        assert!(outcome.renewed.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_refresh_skips_store() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store.clone());

        let outcome = evaluate(&backend, &creds(Some("garbage"), Some("also-garbage"))).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshInvalid);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_access_without_refresh() {
        let store = Arc::new(FixedStore::new(Ok(true)));
        let backend = backend(store);

        let outcome = evaluate(&backend, &creds(Some("garbage"), None)).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshInvalid);
        assert!(outcome.identity.is_none());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_anonymous() {
        let store = Arc::new(FixedStore::new(Err(())));
        let backend = backend(store);
        let access = token(&backend, "alice", Role::Member);
        let refresh = token(&backend, "alice", Role::Member);

        let outcome = evaluate(&backend, &creds(Some(&access), Some(&refresh))).await;
        assert_eq!(outcome.state, CredentialState::AccessValidRefreshInvalid);

        let outcome = evaluate(&backend, &creds(None, Some(&refresh))).await;
        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshInvalid);
        assert!(outcome.renewed.is_none());
    }

    #[tokio::test]
    async fn test_store_timeout_degrades_to_anonymous() {
        let store = Arc::new(FixedStore {
            delay: Duration::from_secs(30),
            ..FixedStore::new(Ok(true))
        });
        let backend = backend(store);
        let refresh = token(&backend, "alice", Role::Member);

        let started = std::time::Instant::now();
        let outcome = evaluate(&backend, &creds(None, Some(&refresh))).await;

        assert_eq!(outcome.state, CredentialState::AccessInvalidRefreshInvalid);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_renewal_cookie_goes_before_handler_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("accessToken=; Max-Age=0"));
        headers.append(SET_COOKIE, HeaderValue::from_static("refreshToken=; Max-Age=0"));

        prepend_set_cookie(&mut headers, HeaderValue::from_static("accessToken=renewed"));

        let values: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(
            values,
            vec![
                "accessToken=renewed",
                "accessToken=; Max-Age=0",
                "refreshToken=; Max-Age=0"
            ]
        );
    }

    #[test]
    fn test_renewal_cookie_alone() {
        let mut headers = HeaderMap::new();

        prepend_set_cookie(&mut headers, HeaderValue::from_static("accessToken=renewed"));

        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 1);
    }
}
