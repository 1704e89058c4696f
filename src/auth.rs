use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration, Utc};
use hmac_sha256::HMAC;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::models::User;
use crate::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Payload carried by a bearer token. The role is deliberately absent: it is
/// always read from the stored user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub username: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    #[error("Missing or invalid authorization header")]
    MissingOrInvalidHeader,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Unknown user")]
    UnknownUser,

    #[error("Admin access required")]
    Forbidden,

    #[error("Internal server error during authentication")]
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn encode(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

/// Signs `{username, exp}` with `secret`, valid for `ttl` from `now`.
pub fn issue_token(secret: &str, username: &str, ttl: Duration, now: DateTime<Utc>) -> String {
    let claims = Claims {
        username: username.to_string(),
        exp: (now + ttl).timestamp(),
    };
    // Serialising a struct of a String and an i64 cannot fail.
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let mac = HMAC::mac(&payload, secret.as_bytes());
    format!("{}.{}", encode(&payload), encode(&mac))
}

/// Checks the signature and expiry of a token and returns its claims.
pub fn verify_token(secret: &str, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
    let (payload_b64, mac_b64) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
    let payload = base64::decode_config(payload_b64, base64::URL_SAFE_NO_PAD)
        .map_err(|_| AuthError::InvalidToken)?;
    let mac = base64::decode_config(mac_b64, base64::URL_SAFE_NO_PAD)
        .map_err(|_| AuthError::InvalidToken)?;

    let expected = HMAC::mac(&payload, secret.as_bytes());
    if !constant_time_eq::constant_time_eq(&expected, &mac) {
        return Err(AuthError::InvalidToken);
    }

    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidToken)?;
    if claims.exp <= now.timestamp() {
        return Err(AuthError::Expired);
    }
    Ok(claims)
}

// --- Authenticated User Extractor ---

/// The caller, as currently stored. Ban status is not reconciled here.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(cached) = parts.extensions.get::<Result<Self, AuthError>>() {
            return cached.clone();
        }

        let app_state = AppState::from_ref(state);

        let result = async {
            let token = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix(BEARER_PREFIX))
                .ok_or(AuthError::MissingOrInvalidHeader)?;

            let claims = verify_token(&app_state.config.token_secret, token.trim(), Utc::now())?;

            let user = app_state
                .users
                .get_user(&claims.username)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to load user during authentication");
                    AuthError::InternalError
                })?
                .ok_or_else(|| {
                    warn!(username = %claims.username, "Token presented for unknown user");
                    AuthError::UnknownUser
                })?;

            Ok(AuthenticatedUser(user))
        }
        .await;

        parts.extensions.insert(result.clone());
        debug!(authenticated = result.is_ok(), "Authentication attempted");
        result
    }
}

// --- Admin User Extractor ---

#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if user.is_admin() {
            Ok(AdminUser(user))
        } else {
            warn!(username = %user.username, "Admin access denied");
            Err(AuthError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{NewUser, Role};
    use crate::repositories::Repositories;
    use axum::body::Body;
    use axum::http::Request;

    const SECRET: &str = "unit-test-secret";

    async fn setup_test_state() -> AppState {
        let mut config = Config::for_tests();
        config.token_secret = SECRET.to_string();
        let state = AppState::new(Repositories::in_memory(), config);
        state
            .users
            .create_user(NewUser { username: "alice".into(), role: Role::User })
            .await
            .unwrap();
        state
            .users
            .create_user(NewUser { username: "root".into(), role: Role::Admin })
            .await
            .unwrap();
        state
    }

    fn parts_with_token(token: Option<&str>) -> Parts {
        let mut builder = Request::builder();
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap().into_parts().0
    }

    #[test]
    fn token_round_trips_before_expiry() {
        let now = Utc::now();
        let token = issue_token(SECRET, "alice", Duration::hours(1), now);
        let claims = verify_token(SECRET, &token, now).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let token = issue_token(SECRET, "alice", Duration::hours(1), now);
        assert_eq!(
            verify_token(SECRET, &token, now + Duration::hours(2)),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn tampered_token_is_rejected() {
        let now = Utc::now();
        let token = issue_token(SECRET, "alice", Duration::hours(1), now);
        let (_, mac) = token.split_once('.').unwrap();
        let forged_claims = Claims { username: "root".into(), exp: now.timestamp() + 3600 };
        let forged = format!("{}.{}", encode(&serde_json::to_vec(&forged_claims).unwrap()), mac);

        assert_eq!(verify_token(SECRET, &forged, now), Err(AuthError::InvalidToken));
        assert_eq!(verify_token("other-secret", &token, now), Err(AuthError::InvalidToken));
        assert_eq!(verify_token(SECRET, "not-a-token", now), Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_auth_extractor_success() {
        let state = setup_test_state().await;
        let token = issue_token(SECRET, "alice", Duration::hours(1), Utc::now());
        let mut parts = parts_with_token(Some(&token));

        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_auth_extractor_missing_header() {
        let state = setup_test_state().await;
        let mut parts = parts_with_token(None);

        let result = AuthenticatedUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingOrInvalidHeader)));
    }

    #[tokio::test]
    async fn test_auth_extractor_unknown_user() {
        let state = setup_test_state().await;
        let token = issue_token(SECRET, "ghost", Duration::hours(1), Utc::now());
        let mut parts = parts_with_token(Some(&token));

        let result = AuthenticatedUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::UnknownUser)));
    }

    #[tokio::test]
    async fn test_admin_extractor_checks_stored_role() {
        let state = setup_test_state().await;

        let token = issue_token(SECRET, "alice", Duration::hours(1), Utc::now());
        let mut parts = parts_with_token(Some(&token));
        let result = AdminUser::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));

        let token = issue_token(SECRET, "root", Duration::hours(1), Utc::now());
        let mut parts = parts_with_token(Some(&token));
        let AdminUser(admin) = AdminUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(admin.username, "root");
    }
}
