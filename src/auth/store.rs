//! Persistence seams consumed by the gate and the session issuer.
//!
//! Both traits are object safe so the gate can run against the SQLite
//! database in production and against stub stores in tests.

use async_trait::async_trait;

use crate::db::{Database, Member, Role};
use crate::jwt::unix_now;

/// Refresh record store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// True iff a matching, unexpired refresh record exists.
    async fn validate(&self, token: &str) -> Result<bool, StoreError>;

    /// Record a refresh token issued to `subject`.
    async fn insert(&self, subject: &str, token: &str, expires_at: u64) -> Result<(), StoreError>;

    /// Remove every refresh record of `subject`. Returns how many were removed.
    async fn invalidate(&self, subject: &str) -> Result<u64, StoreError>;
}

/// Member store used for login and sign-up.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find(&self, member_id: &str) -> Result<Option<Member>, StoreError>;

    async fn create(&self, member_id: &str, password_hash: &str, role: Role)
    -> Result<(), StoreError>;

    async fn is_available(&self, member_id: &str) -> Result<bool, StoreError>;
}

/// Store-time failures.
#[derive(Debug)]
pub enum StoreError {
    /// Backend failed or did not answer in time
    Unavailable(String),
    /// No matching record
    RecordNotFound,
    /// Unique constraint violated
    Duplicate,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {}", e),
            StoreError::RecordNotFound => write!(f, "Record not found"),
            StoreError::Duplicate => write!(f, "Record already exists"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Unavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn validate(&self, token: &str) -> Result<bool, StoreError> {
        let now = unix_now().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(self.refresh_tokens().is_valid(token, now).await?)
    }

    async fn insert(&self, subject: &str, token: &str, expires_at: u64) -> Result<(), StoreError> {
        self.refresh_tokens()
            .create(subject, token, expires_at)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, subject: &str) -> Result<u64, StoreError> {
        Ok(self.refresh_tokens().delete_by_member(subject).await?)
    }
}

#[async_trait]
impl MemberDirectory for Database {
    async fn find(&self, member_id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self.members().get(member_id).await?)
    }

    async fn create(
        &self,
        member_id: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        Ok(self.members().create(member_id, password_hash, role).await?)
    }

    async fn is_available(&self, member_id: &str) -> Result<bool, StoreError> {
        Ok(self.members().is_available(member_id).await?)
    }
}
