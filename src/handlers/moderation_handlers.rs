use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    auth::{AdminUser, AuthenticatedUser},
    errors::AppError,
    extract::ApiJson,
    models::UserView,
    moderation::SanctionOutcome,
    AppState,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WarnRequest {
    pub username: String,
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub username: String,
    /// Absent for a permanent ban.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UnbanRequest {
    pub username: String,
    #[serde(default)]
    pub reset_warnings: bool,
}

#[derive(Deserialize, Debug)]
pub struct UsernameRequest {
    pub username: String,
}

/// Records a violation directly. Users may report their own; admins anyone's.
pub async fn warn_user_handler(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    ApiJson(request): ApiJson<WarnRequest>,
) -> Result<Json<SanctionOutcome>, AppError> {
    if caller.username != request.username && !caller.is_admin() {
        warn!(caller = %caller.username, target = %request.username, "Warn denied");
        return Err(AppError::forbidden("You can only record warnings against yourself"));
    }

    let outcome = state
        .ledger
        .record_violation(&request.username, &request.matched_terms, Utc::now())
        .await?;
    Ok(Json(outcome))
}

pub async fn ban_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<BanRequest>,
) -> Result<Json<UserView>, AppError> {
    let user = state
        .admin
        .ban(&admin, &request.username, request.until, Utc::now())
        .await?;
    Ok(Json(UserView::from(&user)))
}

pub async fn unban_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<UnbanRequest>,
) -> Result<Json<UserView>, AppError> {
    let user = state
        .admin
        .unban(&admin, &request.username, request.reset_warnings)
        .await?;
    Ok(Json(UserView::from(&user)))
}

pub async fn reset_warnings_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiJson(request): ApiJson<UsernameRequest>,
) -> Result<Json<UserView>, AppError> {
    let user = state.admin.reset_warnings(&admin, &request.username).await?;
    Ok(Json(UserView::from(&user)))
}

/// Users whose ban is still in force, lapsed bans cleared first.
pub async fn list_banned_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<UserView>>, AppError> {
    let banned = state.admin.list_banned(&admin, Utc::now()).await?;
    info!(count = banned.len(), "Listed banned users");
    Ok(Json(banned.iter().map(UserView::from).collect()))
}
