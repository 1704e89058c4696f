use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::apply_ledger_change;
use crate::errors::AppError;
use crate::models::{BanStatus, LedgerState, User};
use crate::repositories::UserRepository;

/// Answers "is this user blocked" and owns ban lifecycle transitions.
///
/// Every reader of ban status goes through [`BanState::reconcile`], which
/// clears a temporary ban once it has lapsed.
#[derive(Clone)]
pub struct BanState {
    users: Arc<dyn UserRepository>,
    appeal_url: String,
}

impl BanState {
    pub fn new(users: Arc<dyn UserRepository>, appeal_url: impl Into<String>) -> Self {
        Self {
            users,
            appeal_url: appeal_url.into(),
        }
    }

    /// Loads `username`, clearing a lapsed temporary ban before returning it.
    pub async fn reconcile(&self, username: &str, now: DateTime<Utc>) -> Result<User, AppError> {
        let user = apply_ledger_change(self.users.as_ref(), username, |current| {
            current.ban.has_lapsed_at(now).then(|| LedgerState {
                forum_warnings: current.forum_warnings,
                ban: BanStatus::NotBanned,
            })
        })
        .await?;
        Ok(user)
    }

    /// Same as [`BanState::reconcile`] for a record that was already loaded;
    /// only touches the store when the ban has lapsed.
    pub async fn reconcile_user(&self, user: User, now: DateTime<Utc>) -> Result<User, AppError> {
        if !user.ban.has_lapsed_at(now) {
            return Ok(user);
        }
        info!(username = %user.username, "Clearing lapsed temporary ban");
        self.reconcile(&user.username, now).await
    }

    pub async fn is_blocked(&self, username: &str, now: DateTime<Utc>) -> Result<bool, AppError> {
        let user = self.reconcile(username, now).await?;
        Ok(user.ban.is_active_at(now))
    }

    /// Returns the reconciled user, or `Forbidden` naming the ban's end or the
    /// appeal channel.
    pub async fn ensure_not_blocked(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let user = self.reconcile(username, now).await?;
        match user.ban {
            BanStatus::NotBanned => Ok(user),
            BanStatus::Temporary { until } => {
                warn!(username = %username, %until, "Blocked submission from temporarily banned user");
                Err(AppError::forbidden(format!(
                    "You are banned from posting until {}.",
                    until.to_rfc3339_opts(SecondsFormat::Secs, true)
                )))
            }
            BanStatus::Permanent => {
                warn!(username = %username, "Blocked submission from permanently banned user");
                Err(AppError::forbidden(format!(
                    "You are banned from posting. Please join our Discord server to appeal: {}",
                    self.appeal_url
                )))
            }
        }
    }

    /// Bans `username` until `until`, or permanently when `None`. Warnings are
    /// not touched.
    pub async fn manual_ban(
        &self,
        username: &str,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let ban = match until {
            Some(until) if until <= now => {
                return Err(AppError::bad_request("Ban expiry must be in the future"));
            }
            Some(until) => BanStatus::Temporary { until },
            None => BanStatus::Permanent,
        };

        let user = apply_ledger_change(self.users.as_ref(), username, |current| {
            Some(LedgerState {
                forum_warnings: current.forum_warnings,
                ban,
            })
        })
        .await?;
        info!(username = %username, ban_expiry = ?until, "User banned manually");
        Ok(user)
    }

    /// Lifts any ban. Warnings are not touched.
    pub async fn manual_unban(&self, username: &str) -> Result<User, AppError> {
        let user = apply_ledger_change(self.users.as_ref(), username, |current| {
            Some(LedgerState {
                forum_warnings: current.forum_warnings,
                ban: BanStatus::NotBanned,
            })
        })
        .await?;
        info!(username = %username, "User unbanned");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use crate::repositories::MemoryUserRepository;
    use chrono::Duration;

    async fn setup() -> (BanState, Arc<dyn UserRepository>) {
        let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::new());
        users
            .create_user(NewUser { username: "finn".into(), role: Role::User })
            .await
            .unwrap();
        (BanState::new(users.clone(), "https://appeal.example"), users)
    }

    #[tokio::test]
    async fn lapsed_ban_is_cleared_on_check() {
        let (bans, users) = setup().await;
        let now = Utc::now();
        bans.manual_ban("finn", Some(now + Duration::hours(24)), now)
            .await
            .unwrap();

        assert!(bans.is_blocked("finn", now + Duration::hours(23)).await.unwrap());
        let stored = users.get_user("finn").await.unwrap().unwrap();
        assert!(stored.ban.is_banned());

        assert!(!bans.is_blocked("finn", now + Duration::hours(25)).await.unwrap());
        let stored = users.get_user("finn").await.unwrap().unwrap();
        assert_eq!(stored.ban, BanStatus::NotBanned);
    }

    #[tokio::test]
    async fn permanent_ban_names_the_appeal_channel() {
        let (bans, _) = setup().await;
        let now = Utc::now();
        bans.manual_ban("finn", None, now).await.unwrap();

        let err = bans.ensure_not_blocked("finn", now + Duration::days(365)).await.unwrap_err();
        match err {
            AppError::Forbidden(message) => assert!(message.contains("https://appeal.example")),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn manual_ban_and_unban_keep_warnings() {
        let (bans, users) = setup().await;
        let now = Utc::now();
        let user = users.get_user("finn").await.unwrap().unwrap();
        users
            .update_ledger(
                "finn",
                user.ledger_version,
                LedgerState { forum_warnings: 2, ban: BanStatus::NotBanned },
            )
            .await
            .unwrap();

        let banned = bans.manual_ban("finn", None, now).await.unwrap();
        assert_eq!(banned.forum_warnings, 2);
        assert_eq!(banned.ban, BanStatus::Permanent);

        let unbanned = bans.manual_unban("finn").await.unwrap();
        assert_eq!(unbanned.forum_warnings, 2);
        assert_eq!(unbanned.ban, BanStatus::NotBanned);
    }

    #[tokio::test]
    async fn ban_expiry_in_the_past_is_rejected() {
        let (bans, users) = setup().await;
        let now = Utc::now();
        let err = bans
            .manual_ban("finn", Some(now - Duration::minutes(1)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!users.get_user("finn").await.unwrap().unwrap().ban.is_banned());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (bans, _) = setup().await;
        let err = bans.is_blocked("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
