use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::apply_ledger_change;
use crate::constants::TEMPORARY_BAN_HOURS;
use crate::errors::AppError;
use crate::models::{BanStatus, LedgerState, User};
use crate::repositories::UserRepository;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SanctionAction {
    Warned,
    TemporarilyBanned,
    PermanentlyBanned,
}

/// What a violation did to the user's ledger, plus the text to show them.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SanctionOutcome {
    pub action: SanctionAction,
    pub warnings: i32,
    pub is_banned: bool,
    pub ban_expiry: Option<DateTime<Utc>>,
    pub matched_terms: Vec<String>,
    pub reason: String,
    pub message: String,
}

/// Computes the ledger after one more violation.
///
/// The second violation bans until `now + 24h`, the third and later ones ban
/// permanently. A ban already running longer than the escalation is kept.
pub fn escalate(current: LedgerState, now: DateTime<Utc>) -> LedgerState {
    let existing = if current.ban.has_lapsed_at(now) {
        BanStatus::NotBanned
    } else {
        current.ban
    };
    let forum_warnings = current.forum_warnings.saturating_add(1);

    let ban = match forum_warnings {
        i32::MIN..=1 => existing,
        2 => {
            let until = now + Duration::hours(TEMPORARY_BAN_HOURS);
            match existing {
                BanStatus::Permanent => BanStatus::Permanent,
                BanStatus::Temporary { until: longer } if longer > until => existing,
                _ => BanStatus::Temporary { until },
            }
        }
        _ => BanStatus::Permanent,
    };

    LedgerState { forum_warnings, ban }
}

#[derive(Clone)]
pub struct SanctionLedger {
    users: Arc<dyn UserRepository>,
    appeal_url: String,
}

impl SanctionLedger {
    pub fn new(users: Arc<dyn UserRepository>, appeal_url: impl Into<String>) -> Self {
        Self {
            users,
            appeal_url: appeal_url.into(),
        }
    }

    /// Records one violation against `username` and escalates.
    pub async fn record_violation(
        &self,
        username: &str,
        matched_terms: &[String],
        now: DateTime<Utc>,
    ) -> Result<SanctionOutcome, AppError> {
        let user = apply_ledger_change(self.users.as_ref(), username, |current| {
            Some(escalate(current.ledger(), now))
        })
        .await?;

        let outcome = self.outcome_for(&user, matched_terms);
        info!(
            username = %username,
            warnings = outcome.warnings,
            action = ?outcome.action,
            ban_expiry = ?outcome.ban_expiry,
            "Recorded forum violation"
        );
        Ok(outcome)
    }

    /// Sets the warning counter back to zero. Ban fields are left alone.
    pub async fn reset_warnings(&self, username: &str) -> Result<User, AppError> {
        let user = apply_ledger_change(self.users.as_ref(), username, |current| {
            Some(LedgerState {
                forum_warnings: 0,
                ban: current.ban,
            })
        })
        .await?;
        info!(username = %username, "Forum warnings reset");
        Ok(user)
    }

    fn outcome_for(&self, user: &User, matched_terms: &[String]) -> SanctionOutcome {
        let action = match (user.forum_warnings, user.ban) {
            (i32::MIN..=1, _) => SanctionAction::Warned,
            (_, BanStatus::Permanent) => SanctionAction::PermanentlyBanned,
            (_, BanStatus::Temporary { .. }) => SanctionAction::TemporarilyBanned,
            // Unreachable after escalation past one warning.
            (_, BanStatus::NotBanned) => SanctionAction::Warned,
        };

        let terms = matched_terms.join(", ");
        let found = if terms.is_empty() {
            String::new()
        } else {
            format!(" Found: {}", terms)
        };

        let (reason, message) = match (action, user.ban) {
            (SanctionAction::TemporarilyBanned, BanStatus::Temporary { until }) => (
                format!("Temporary ban: {}", terms),
                format!(
                    "You have been temporarily banned until {} due to repeated inappropriate language.{}",
                    until.to_rfc3339_opts(SecondsFormat::Secs, true),
                    found
                ),
            ),
            (SanctionAction::PermanentlyBanned, _) => (
                format!("Permanent ban: {}", terms),
                format!(
                    "You have been permanently banned from the forum. Please join our Discord server to appeal: {}",
                    self.appeal_url
                ),
            ),
            _ => (
                format!("Inappropriate language: {}", terms),
                format!(
                    "Warning: Inappropriate language detected. Please use respectful language.{}",
                    found
                ),
            ),
        };

        SanctionOutcome {
            action,
            warnings: user.forum_warnings,
            is_banned: user.ban.is_banned(),
            ban_expiry: user.ban.expiry(),
            matched_terms: matched_terms.to_vec(),
            reason,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use crate::repositories::MemoryUserRepository;
    use futures::future::join_all;

    const APPEAL: &str = "https://discord.gg/dear-diary-expense-tracker";

    async fn ledger_with_user(username: &str) -> (SanctionLedger, Arc<dyn UserRepository>) {
        let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::new());
        users
            .create_user(NewUser { username: username.into(), role: Role::User })
            .await
            .unwrap();
        (SanctionLedger::new(users.clone(), APPEAL), users)
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn escalation_follows_the_warning_count() {
        let now = Utc::now();
        let clean = LedgerState { forum_warnings: 0, ban: BanStatus::NotBanned };

        let first = escalate(clean, now);
        assert_eq!(first, LedgerState { forum_warnings: 1, ban: BanStatus::NotBanned });

        let second = escalate(first, now);
        assert_eq!(second.forum_warnings, 2);
        assert_eq!(second.ban, BanStatus::Temporary { until: now + Duration::hours(24) });

        let third = escalate(second, now);
        assert_eq!(third, LedgerState { forum_warnings: 3, ban: BanStatus::Permanent });

        let fourth = escalate(third, now);
        assert_eq!(fourth, LedgerState { forum_warnings: 4, ban: BanStatus::Permanent });
    }

    #[test]
    fn escalation_never_shortens_an_existing_ban() {
        let now = Utc::now();
        let permanent = LedgerState { forum_warnings: 1, ban: BanStatus::Permanent };
        assert_eq!(escalate(permanent, now).ban, BanStatus::Permanent);

        let far = now + Duration::days(30);
        let long_temp = LedgerState { forum_warnings: 1, ban: BanStatus::Temporary { until: far } };
        assert_eq!(escalate(long_temp, now).ban, BanStatus::Temporary { until: far });

        let lapsed = LedgerState {
            forum_warnings: 0,
            ban: BanStatus::Temporary { until: now - Duration::hours(1) },
        };
        assert_eq!(escalate(lapsed, now).ban, BanStatus::NotBanned);
    }

    #[tokio::test]
    async fn three_violations_walk_the_sanction_ladder() {
        let (ledger, users) = ledger_with_user("dana").await;
        let now = Utc::now();

        let first = ledger.record_violation("dana", &terms(&["damn"]), now).await.unwrap();
        assert_eq!(first.action, SanctionAction::Warned);
        assert_eq!(first.warnings, 1);
        assert!(!first.is_banned);
        assert_eq!(first.reason, "Inappropriate language: damn");
        assert_eq!(
            first.message,
            "Warning: Inappropriate language detected. Please use respectful language. Found: damn"
        );

        let second = ledger.record_violation("dana", &terms(&["crap"]), now).await.unwrap();
        assert_eq!(second.action, SanctionAction::TemporarilyBanned);
        assert_eq!(second.warnings, 2);
        assert!(second.is_banned);
        assert_eq!(second.ban_expiry, Some(now + Duration::hours(24)));
        assert_eq!(second.reason, "Temporary ban: crap");

        let third = ledger.record_violation("dana", &terms(&["hate"]), now).await.unwrap();
        assert_eq!(third.action, SanctionAction::PermanentlyBanned);
        assert_eq!(third.warnings, 3);
        assert!(third.is_banned);
        assert_eq!(third.ban_expiry, None);
        assert!(third.message.contains(APPEAL));

        let stored = users.get_user("dana").await.unwrap().unwrap();
        assert_eq!(stored.forum_warnings, 3);
        assert_eq!(stored.ban, BanStatus::Permanent);
    }

    #[tokio::test]
    async fn violation_for_unknown_user_is_not_found() {
        let (ledger, _) = ledger_with_user("dana").await;
        let err = ledger
            .record_violation("nobody", &terms(&["damn"]), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reset_keeps_the_ban() {
        let (ledger, _) = ledger_with_user("dana").await;
        let now = Utc::now();
        ledger.record_violation("dana", &[], now).await.unwrap();
        ledger.record_violation("dana", &[], now).await.unwrap();

        let user = ledger.reset_warnings("dana").await.unwrap();
        assert_eq!(user.forum_warnings, 0);
        assert_eq!(user.ban, BanStatus::Temporary { until: now + Duration::hours(24) });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_violations_are_all_counted() {
        let (ledger, users) = ledger_with_user("eve").await;
        let now = Utc::now();
        let flagged = terms(&["idiot"]);

        let tasks = (0..8).map(|_| {
            let ledger = ledger.clone();
            let flagged = flagged.clone();
            tokio::spawn(async move { ledger.record_violation("eve", &flagged, now).await })
        });
        let outcomes: Vec<SanctionOutcome> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let mut counts: Vec<i32> = outcomes.iter().map(|o| o.warnings).collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=8).collect::<Vec<_>>());

        let stored = users.get_user("eve").await.unwrap().unwrap();
        assert_eq!(stored.forum_warnings, 8);
        assert_eq!(stored.ban, BanStatus::Permanent);
        assert_eq!(stored.ledger_version, 8);
    }
}
