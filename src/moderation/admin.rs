use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{apply_ledger_change, BanState, SanctionLedger};
use crate::errors::AppError;
use crate::models::{BanStatus, LedgerState, User};
use crate::repositories::UserRepository;

/// Privileged moderation operations. Every call checks the requester's
/// stored role.
#[derive(Clone)]
pub struct ModerationAdmin {
    users: Arc<dyn UserRepository>,
    ban_state: BanState,
    ledger: SanctionLedger,
}

impl ModerationAdmin {
    pub fn new(users: Arc<dyn UserRepository>, ban_state: BanState, ledger: SanctionLedger) -> Self {
        Self {
            users,
            ban_state,
            ledger,
        }
    }

    pub fn require_admin(requester: &User) -> Result<(), AppError> {
        if requester.is_admin() {
            Ok(())
        } else {
            warn!(username = %requester.username, "Non-admin attempted a moderation action");
            Err(AppError::forbidden("Admin access required"))
        }
    }

    /// All users, each reconciled so lapsed bans show as lifted.
    pub async fn list_users(&self, requester: &User, now: DateTime<Utc>) -> Result<Vec<User>, AppError> {
        Self::require_admin(requester)?;
        let mut reconciled = Vec::new();
        for user in self.users.list_users().await? {
            reconciled.push(self.ban_state.reconcile_user(user, now).await?);
        }
        Ok(reconciled)
    }

    /// Users whose ban is still in force after reconciliation.
    pub async fn list_banned(&self, requester: &User, now: DateTime<Utc>) -> Result<Vec<User>, AppError> {
        let users = self.list_users(requester, now).await?;
        Ok(users
            .into_iter()
            .filter(|user| user.ban.is_active_at(now))
            .collect())
    }

    pub async fn ban(
        &self,
        requester: &User,
        username: &str,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<User, AppError> {
        Self::require_admin(requester)?;
        info!(admin = %requester.username, target = %username, "Admin ban requested");
        self.ban_state.manual_ban(username, until, now).await
    }

    /// Lifts the ban; with `reset_warnings` the counter is zeroed in the same
    /// write.
    pub async fn unban(
        &self,
        requester: &User,
        username: &str,
        reset_warnings: bool,
    ) -> Result<User, AppError> {
        Self::require_admin(requester)?;
        info!(admin = %requester.username, target = %username, reset_warnings, "Admin unban requested");
        if !reset_warnings {
            return self.ban_state.manual_unban(username).await;
        }
        apply_ledger_change(self.users.as_ref(), username, |_| {
            Some(LedgerState {
                forum_warnings: 0,
                ban: BanStatus::NotBanned,
            })
        })
        .await
    }

    pub async fn reset_warnings(&self, requester: &User, username: &str) -> Result<User, AppError> {
        Self::require_admin(requester)?;
        self.ledger.reset_warnings(username).await
    }
}
