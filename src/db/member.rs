use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct MemberStore {
    pool: SqlitePool,
}

/// Member role for authorization. Carried in tokens as the `auth` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_MEMBER")]
    Member,
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "ROLE_MEMBER",
            Role::Admin => "ROLE_ADMIN",
        }
    }

    /// Parse a role tag. Unknown tags yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROLE_MEMBER" => Some(Role::Member),
            "ROLE_ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub member_id: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    member_id: String,
    password_hash: String,
    role: String,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Self {
            member_id: row.member_id,
            password_hash: row.password_hash,
            // Rows are only written through `create`, which stores a known tag
            role: Role::parse(&row.role).unwrap_or(Role::Member),
        }
    }
}

/// Public member summary for the admin listing. Never exposes the password hash.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemberSummary {
    pub member_id: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct MemberSummaryRow {
    member_id: String,
    role: String,
    created_at: String,
}

impl From<MemberSummaryRow> for MemberSummary {
    fn from(row: MemberSummaryRow) -> Self {
        Self {
            member_id: row.member_id,
            role: Role::parse(&row.role).unwrap_or(Role::Member),
            created_at: row.created_at,
        }
    }
}

impl MemberStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a member with an already-hashed password.
    pub async fn create(
        &self,
        member_id: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO members (member_id, password_hash, role) VALUES (?, ?, ?)")
            .bind(member_id)
            .bind(password_hash)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get a member by identifier.
    pub async fn get(&self, member_id: &str) -> Result<Option<Member>, sqlx::Error> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT member_id, password_hash, role FROM members WHERE member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Member::from))
    }

    /// Check whether an identifier is still free.
    pub async fn is_available(&self, member_id: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE member_id = ?")
            .bind(member_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 == 0)
    }

    /// Set the role for a member.
    pub async fn set_role(&self, member_id: &str, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE members SET role = ? WHERE member_id = ?")
            .bind(role.as_str())
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all members (for the admin listing).
    pub async fn list(&self) -> Result<Vec<MemberSummary>, sqlx::Error> {
        let rows: Vec<MemberSummaryRow> = sqlx::query_as(
            "SELECT member_id, role, created_at FROM members ORDER BY created_at, member_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MemberSummary::from).collect())
    }
}
