//! Refresh token records.
//!
//! Only refresh tokens are stored. Access tokens are stateless; a refresh
//! token is honoured for renewal only while its exact row exists here and
//! has not expired, which is what makes logout effective.

use sqlx::sqlite::SqlitePool;

/// A stored refresh token record.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub member_id: String,
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub created_at: String,
}

/// Store for managing refresh token records.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a newly issued refresh token.
    pub async fn create(
        &self,
        member_id: &str,
        token: &str,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (member_id, token, expires_at) VALUES (?, ?, ?)",
        )
        .bind(member_id)
        .bind(token)
        .bind(to_sql_time(expires_at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// True iff an exact matching record exists and expires after `now`.
    pub async fn is_valid(&self, token: &str, now: u64) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens WHERE token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(to_sql_time(now))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// List all records for a member, newest first.
    pub async fn list_by_member(
        &self,
        member_id: &str,
    ) -> Result<Vec<RefreshTokenRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, member_id, token, expires_at, created_at FROM refresh_tokens WHERE member_id = ? ORDER BY id DESC",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete every record for a member (logout).
    pub async fn delete_by_member(&self, member_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE member_id = ?")
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete all records that expired at or before `now`.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(to_sql_time(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// SQLite integers are signed; clamp instead of wrapping.
fn to_sql_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, Role};

    const NOW: u64 = 1_750_000_000;

    async fn db_with_member(member_id: &str) -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.members()
            .create(member_id, "hash", Role::Member)
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_valid_until_expiry() {
        let db = db_with_member("alice").await;
        db.refresh_tokens()
            .create("alice", "token-1", NOW + 100)
            .await
            .unwrap();

        let store = db.refresh_tokens();
        assert!(store.is_valid("token-1", NOW).await.unwrap());
        assert!(store.is_valid("token-1", NOW + 99).await.unwrap());
        assert!(!store.is_valid("token-1", NOW + 100).await.unwrap());
        assert!(!store.is_valid("token-2", NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_member() {
        let db = db_with_member("alice").await;
        db.members()
            .create("bob", "hash", Role::Member)
            .await
            .unwrap();

        let store = db.refresh_tokens();
        store.create("alice", "a-1", NOW + 100).await.unwrap();
        store.create("alice", "a-2", NOW + 100).await.unwrap();
        store.create("bob", "b-1", NOW + 100).await.unwrap();

        assert_eq!(store.delete_by_member("alice").await.unwrap(), 2);
        assert!(store.list_by_member("alice").await.unwrap().is_empty());
        assert!(store.is_valid("b-1", NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = db_with_member("alice").await;
        let store = db.refresh_tokens();
        store.create("alice", "old", NOW - 1).await.unwrap();
        store.create("alice", "fresh", NOW + 100).await.unwrap();

        assert_eq!(store.delete_expired(NOW).await.unwrap(), 1);
        let remaining = store.list_by_member("alice").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, "fresh");
        assert_eq!(remaining[0].expires_at, (NOW + 100) as i64);
    }
}
