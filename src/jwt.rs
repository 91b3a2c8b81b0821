//! JWT credential encoding and verification.
//!
//! Access and refresh tokens share one claim shape (`sub`, `auth`, `iat`,
//! `exp`, plus a random `jti`) and differ only in lifetime and in where
//! they are trusted from.
//! Tokens are HS256 signed with a process-wide secret.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db::Role;

/// Minimum signing key length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Default access token lifetime: 15 minutes
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 30 days
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// A verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Member identifier
    pub subject: String,
    /// Authorization tag
    pub role: Role,
    /// Issued at (Unix seconds)
    pub issued_at: u64,
    /// Expiration time (Unix seconds)
    pub expires_at: u64,
}

/// Claims as written into the token.
#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    auth: &'a str,
    iat: u64,
    exp: u64,
    /// Random token id so two tokens minted in the same second differ
    jti: String,
}

/// Claims as read back. Everything is optional so missing claims can be
/// told apart from malformed JSON.
#[derive(Deserialize)]
struct RawClaims {
    sub: Option<String>,
    auth: Option<String>,
    iat: Option<u64>,
    exp: Option<u64>,
}

/// Result of minting a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token lifetime in seconds
    pub duration: u64,
}

/// Signs and verifies credentials. Immutable once built; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a codec for the given secret.
    /// Secrets shorter than [`MIN_SECRET_LENGTH`] bytes are rejected.
    pub fn new(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(JwtError::WeakKey { len: secret.len() });
        }

        // Expiry is checked by hand against an explicit "now" so the
        // boundary has no leeway and can be tested.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims::<&str>(&[]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign a credential for `subject` valid for `lifetime` from now.
    pub fn encode(
        &self,
        subject: &str,
        role: Role,
        lifetime: Duration,
    ) -> Result<IssuedToken, JwtError> {
        self.encode_at(subject, role, lifetime, unix_now()?)
    }

    /// Sign a credential as if the current time were `now` (Unix seconds).
    pub fn encode_at(
        &self,
        subject: &str,
        role: Role,
        lifetime: Duration,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let duration = lifetime.as_secs();
        let exp = now.saturating_add(duration);

        let claims = Claims {
            sub: subject,
            auth: role.as_str(),
            iat: now,
            exp,
            jti: format!("{:032x}", rand::random::<u128>()),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Verify a token and return its credential.
    pub fn decode(&self, token: &str) -> Result<Credential, DecodeError> {
        // A clock before the epoch cannot vouch for any expiry.
        let Ok(now) = unix_now() else {
            return Err(DecodeError::Expired);
        };
        self.decode_at(token, now)
    }

    /// Verify a token as if the current time were `now` (Unix seconds).
    pub fn decode_at(&self, token: &str, now: u64) -> Result<Credential, DecodeError> {
        if token.trim().is_empty() {
            return Err(DecodeError::EmptyClaims);
        }

        let data = jsonwebtoken::decode::<RawClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| classify(&e))?;
        let claims = data.claims;

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::EmptyClaims)?;
        let role_tag = claims
            .auth
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::EmptyClaims)?;
        let issued_at = claims.iat.ok_or(DecodeError::EmptyClaims)?;
        let expires_at = claims.exp.ok_or(DecodeError::EmptyClaims)?;

        if now >= expires_at {
            return Err(DecodeError::Expired);
        }

        let role = Role::parse(&role_tag).ok_or(DecodeError::Unsupported)?;

        Ok(Credential {
            subject,
            role,
            issued_at,
            expires_at,
        })
    }
}

fn classify(err: &jsonwebtoken::errors::Error) -> DecodeError {
    match err.kind() {
        ErrorKind::InvalidSignature => DecodeError::BadSignature,
        ErrorKind::ExpiredSignature => DecodeError::Expired,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => DecodeError::Unsupported,
        ErrorKind::MissingRequiredClaim(_) => DecodeError::EmptyClaims,
        _ => DecodeError::Malformed,
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Why a token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Not a structurally valid JWT
    Malformed,
    /// Signature does not match the signing key
    BadSignature,
    /// Past its embedded expiration instant
    Expired,
    /// Wrong algorithm or unknown role tag
    Unsupported,
    /// Empty token or missing claims
    EmptyClaims,
}

impl DecodeError {
    /// Short label for structured logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeError::Malformed => "malformed",
            DecodeError::BadSignature => "bad_signature",
            DecodeError::Expired => "expired",
            DecodeError::Unsupported => "unsupported",
            DecodeError::EmptyClaims => "empty_claims",
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Malformed => write!(f, "Malformed token"),
            DecodeError::BadSignature => write!(f, "Invalid token signature"),
            DecodeError::Expired => write!(f, "Expired token"),
            DecodeError::Unsupported => write!(f, "Unsupported token"),
            DecodeError::EmptyClaims => write!(f, "Token claims are empty"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors from building the codec or minting tokens.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Signing key too short
    WeakKey { len: usize },
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WeakKey { len } => write!(
                f,
                "Signing key is {} bytes, at least {} are required",
                len, MIN_SECRET_LENGTH
            ),
        }
    }
}

impl std::error::Error for JwtError {}
