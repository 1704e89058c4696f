pub mod admin;
pub mod ban_state;
pub mod content_filter;
pub mod sanction_ledger;

pub use admin::ModerationAdmin;
pub use ban_state::BanState;
pub use content_filter::{scan, ScanResult, MODERATION_TERMS};
pub use sanction_ledger::{SanctionAction, SanctionLedger, SanctionOutcome};

use tracing::{debug, warn};

use crate::constants::MAX_LEDGER_RETRIES;
use crate::errors::AppError;
use crate::models::{LedgerState, User};
use crate::repositories::{LedgerUpdate, UserRepository};

/// Applies `change` to the latest committed ledger of `username`.
///
/// `change` sees the freshly read user and returns the state to write, or
/// `None` to leave it as is. A stale write re-reads and re-runs `change`, so
/// every event lands exactly once on top of whatever committed before it.
/// Returns the user as stored afterwards.
pub(crate) async fn apply_ledger_change<F>(
    users: &dyn UserRepository,
    username: &str,
    mut change: F,
) -> Result<User, AppError>
where
    F: FnMut(&User) -> Option<LedgerState> + Send,
{
    for attempt in 0..MAX_LEDGER_RETRIES {
        let current = users
            .get_user(username)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {} not found", username)))?;

        let Some(next) = change(&current) else {
            return Ok(current);
        };
        if next == current.ledger() {
            return Ok(current);
        }

        match users
            .update_ledger(username, current.ledger_version, next)
            .await?
        {
            LedgerUpdate::Applied(user) => return Ok(user),
            LedgerUpdate::Stale => {
                debug!(username = %username, attempt, "Ledger write lost a race, retrying");
            }
            LedgerUpdate::Missing => {
                return Err(AppError::not_found(format!("User {} not found", username)));
            }
        }
    }

    warn!(username = %username, retries = MAX_LEDGER_RETRIES, "Ledger retries exhausted");
    Err(AppError::LedgerContention(username.to_string()))
}
