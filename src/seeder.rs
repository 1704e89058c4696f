use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::auth::issue_token;
use crate::config::Config;
use crate::models::{NewUser, Role, User};
use crate::repositories::{RepositoryError, UserRepository};

/// Makes sure an admin account named `username` exists.
///
/// Idempotent: an existing account is returned as is, even when its role is
/// not admin.
pub async fn ensure_admin(users: &dyn UserRepository, username: &str) -> Result<User, RepositoryError> {
    if let Some(existing) = users.get_user(username).await? {
        if !existing.is_admin() {
            warn!(username = %username, "Seed account exists without the admin role");
        }
        return Ok(existing);
    }

    let created = users
        .create_user(NewUser {
            username: username.to_string(),
            role: Role::Admin,
        })
        .await;

    match created {
        Ok(user) => {
            info!(username = %username, "Created admin account");
            Ok(user)
        }
        // Lost a race with a concurrent seeder.
        Err(RepositoryError::Conflict(_)) => users
            .get_user(username)
            .await?
            .ok_or_else(|| RepositoryError::Conflict(username.to_string())),
        Err(e) => Err(e),
    }
}

/// Bearer token for `user` under the configured secret and lifetime.
pub fn token_for(config: &Config, user: &User, now: DateTime<Utc>) -> String {
    issue_token(
        &config.token_secret,
        &user.username,
        Duration::seconds(config.token_ttl_seconds),
        now,
    )
}
