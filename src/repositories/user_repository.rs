use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{LedgerUpdate, RepositoryError, UserRepository};
use crate::models::{BanStatus, LedgerState, NewUser, Role, User};

const USER_COLUMNS: &str =
    "username, role, forum_warnings, is_banned, ban_expiry, ledger_version, created_at";

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    username: String,
    role: String,
    forum_warnings: i32,
    is_banned: bool,
    ban_expiry: Option<DateTime<Utc>>,
    ledger_version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(RepositoryError::Corrupt)?;
        Ok(User {
            username: row.username,
            role,
            forum_warnings: row.forum_warnings,
            ban: BanStatus::from_fields(row.is_banned, row.ban_expiry),
            ledger_version: row.ledger_version,
            created_at: row.created_at,
        })
    }
}

/// Users table access.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC, username ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, role)
            VALUES ($1, $2)
            ON CONFLICT (username) DO NOTHING
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(user.role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => User::try_from(row),
            None => Err(RepositoryError::Conflict(user.username)),
        }
    }

    async fn update_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger: LedgerState,
    ) -> Result<LedgerUpdate, RepositoryError> {
        // The version predicate makes this a single conditional write; a row
        // lock serialises concurrent attempts on the same user.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET forum_warnings = $3,
                is_banned = $4,
                ban_expiry = $5,
                ledger_version = ledger_version + 1
            WHERE username = $1 AND ledger_version = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(username)
        .bind(expected_version)
        .bind(ledger.forum_warnings)
        .bind(ledger.ban.is_banned())
        .bind(ledger.ban.expiry())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(LedgerUpdate::Applied(User::try_from(row)?)),
            None => match self.get_user(username).await? {
                Some(_) => Ok(LedgerUpdate::Stale),
                None => Ok(LedgerUpdate::Missing),
            },
        }
    }
}
