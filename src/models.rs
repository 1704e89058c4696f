use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Account role as stored on the identity record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Ban state of a user.
///
/// Persisted as the `is_banned` / `ban_expiry` column pair; the enum makes
/// "expiry without a ban" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanStatus {
    NotBanned,
    Temporary { until: DateTime<Utc> },
    Permanent,
}

impl BanStatus {
    /// Rebuilds the status from the persisted columns. An expiry stored
    /// alongside `is_banned = false` is ignored.
    pub fn from_fields(is_banned: bool, ban_expiry: Option<DateTime<Utc>>) -> Self {
        match (is_banned, ban_expiry) {
            (false, _) => BanStatus::NotBanned,
            (true, Some(until)) => BanStatus::Temporary { until },
            (true, None) => BanStatus::Permanent,
        }
    }

    pub fn is_banned(&self) -> bool {
        !matches!(self, BanStatus::NotBanned)
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        match self {
            BanStatus::Temporary { until } => Some(*until),
            _ => None,
        }
    }

    /// True for a temporary ban whose expiry is strictly in the past.
    pub fn has_lapsed_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self, BanStatus::Temporary { until } if now > *until)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_banned() && !self.has_lapsed_at(now)
    }
}

/// The sanction ledger fields of a user, written as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerState {
    pub forum_warnings: i32,
    pub ban: BanStatus,
}

/// Identity record with the moderation fields this service owns.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub role: Role,
    pub forum_warnings: i32,
    pub ban: BanStatus,
    /// Bumped on every ledger write; the compare-and-swap token.
    pub ledger_version: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn ledger(&self) -> LedgerState {
        LedgerState {
            forum_warnings: self.forum_warnings,
            ban: self.ban,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub role: Role,
}

/// Wire shape of a user, as returned by `/auth/me` and the admin listings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub username: String,
    pub role: Role,
    pub forum_warnings: i32,
    pub is_banned: bool,
    pub ban_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role,
            forum_warnings: user.forum_warnings,
            is_banned: user.ban.is_banned(),
            ban_expiry: user.ban.expiry(),
            created_at: user.created_at,
        }
    }
}

/// A reply embedded in a post.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    pub author: String,
    pub content: String,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    pub likes: i32,
    #[serde(default)]
    pub liked_by: Vec<String>,
    pub is_moderated: bool,
    pub moderation_reason: Option<String>,
}

/// A top-level forum post with its replies in acceptance order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author: String,
    pub content: String,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    pub likes: i32,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub replies: Vec<Reply>,
    pub is_moderated: bool,
    pub moderation_reason: Option<String>,
}

impl Post {
    pub fn reply(&self, reply_id: Uuid) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == reply_id)
    }
}

/// Content that already passed validation and the content filter.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub author: String,
    pub content: String,
    pub timestamp: String,
}
