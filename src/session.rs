//! Session issuance: login, logout and sign-up.
//!
//! Login mints an access/refresh pair and records the refresh token.
//! Logout deletes every refresh record of the member. Access tokens already
//! handed out stay decodable until they expire, but the gate stops honouring
//! them once their companion refresh token is gone.

use std::sync::{Arc, LazyLock};

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use rand::RngCore;
use tracing::{info, warn};

use crate::auth::{AuthSettings, CredentialStore, MemberDirectory, StoreError};
use crate::db::Role;
use crate::jwt::{IssuedToken, JwtError, TokenCodec};

/// Member identifiers: 1 to 32 ASCII alphanumerics or underscores.
pub const MAX_MEMBER_ID_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Verified against on unknown member ids so that login costs one argon2
/// verification whether or not the member exists.
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("decoy-password-never-matches").ok());

/// Both halves of a fresh session.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Cookie lifetimes in seconds
    pub access_max_age: u64,
    pub refresh_max_age: u64,
}

#[derive(Debug)]
pub enum SessionError {
    /// Unknown member or wrong password
    InvalidCredentials,
    /// Identifier or password fails validation
    InvalidInput(String),
    /// Identifier already taken
    Conflict,
    Store(StoreError),
    Token(JwtError),
    /// Server-side failure unrelated to the caller's input
    Internal(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidCredentials => write!(f, "Invalid credentials"),
            SessionError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SessionError::Conflict => write!(f, "Member ID already taken"),
            SessionError::Store(e) => write!(f, "{}", e),
            SessionError::Token(e) => write!(f, "{}", e),
            SessionError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => SessionError::Conflict,
            e => SessionError::Store(e),
        }
    }
}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        SessionError::Token(e)
    }
}

/// Issues and revokes sessions on behalf of the HTTP layer.
#[derive(Clone)]
pub struct SessionIssuer {
    codec: Arc<TokenCodec>,
    members: Arc<dyn MemberDirectory>,
    store: Arc<dyn CredentialStore>,
    settings: Arc<AuthSettings>,
}

impl SessionIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        members: Arc<dyn MemberDirectory>,
        store: Arc<dyn CredentialStore>,
        settings: Arc<AuthSettings>,
    ) -> Self {
        Self {
            codec,
            members,
            store,
            settings,
        }
    }

    /// Verify the password and mint a token pair.
    pub async fn login(&self, member_id: &str, password: &str) -> Result<TokenPair, SessionError> {
        let Some(member) = self.members.find(member_id).await? else {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                let _ = verify_password(password, decoy);
            }
            warn!(member_id = %member_id, "Login failed: unknown member");
            return Err(SessionError::InvalidCredentials);
        };

        if !verify_password(password, &member.password_hash) {
            warn!(member_id = %member.member_id, "Login failed: wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        let access = self
            .codec
            .encode(&member.member_id, member.role, self.settings.access_ttl)?;
        let refresh = self
            .codec
            .encode(&member.member_id, member.role, self.settings.refresh_ttl)?;

        self.store
            .insert(&member.member_id, &refresh.token, refresh.expires_at)
            .await?;

        info!(member_id = %member.member_id, role = %member.role, "Member logged in");

        Ok(pair(access, refresh))
    }

    /// Delete every refresh record of `member_id`.
    pub async fn logout(&self, member_id: &str) -> Result<u64, SessionError> {
        let removed = self.store.invalidate(member_id).await?;
        info!(member_id = %member_id, removed, "Member logged out");
        Ok(removed)
    }

    /// Register a new member with role `ROLE_MEMBER`.
    pub async fn sign_up(&self, member_id: &str, password: &str) -> Result<(), SessionError> {
        self.register(member_id, password, Role::Member).await
    }

    /// Register a member with an explicit role. Used for bootstrapping admins.
    pub async fn register(
        &self,
        member_id: &str,
        password: &str,
        role: Role,
    ) -> Result<(), SessionError> {
        validate_member_id(member_id)?;
        validate_password(password)?;

        if !self.members.is_available(member_id).await? {
            return Err(SessionError::Conflict);
        }

        let hash = hash_password(password)?;
        self.members.create(member_id, &hash, role).await?;

        info!(member_id = %member_id, role = %role, "Member registered");
        Ok(())
    }

    /// Whether `member_id` is well formed and not yet taken.
    pub async fn is_identifier_available(&self, member_id: &str) -> Result<bool, SessionError> {
        validate_member_id(member_id)?;
        Ok(self.members.is_available(member_id).await?)
    }
}

fn pair(access: IssuedToken, refresh: IssuedToken) -> TokenPair {
    TokenPair {
        access_token: access.token,
        refresh_token: refresh.token,
        access_max_age: access.duration,
        refresh_max_age: refresh.duration,
    }
}

pub fn validate_member_id(member_id: &str) -> Result<(), SessionError> {
    if member_id.is_empty() {
        return Err(SessionError::InvalidInput("Member ID cannot be empty".into()));
    }
    if member_id.len() > MAX_MEMBER_ID_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Member ID must be at most {} characters",
            MAX_MEMBER_ID_LENGTH
        )));
    }
    if !member_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(SessionError::InvalidInput(
            "Member ID may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), SessionError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(SessionError::InvalidInput(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| SessionError::Internal(format!("salt encoding failed: {}", e)))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SessionError::Internal(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string. Unparseable hashes never match.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
