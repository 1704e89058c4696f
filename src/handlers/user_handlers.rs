use axum::{extract::State, Json};
use chrono::Utc;

use crate::{
    auth::{AdminUser, AuthenticatedUser},
    errors::AppError,
    models::UserView,
    AppState,
};

/// The caller's own record, with a lapsed ban already cleared.
pub async fn me_handler(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<UserView>, AppError> {
    let user = state.ban_state.reconcile_user(user, Utc::now()).await?;
    Ok(Json(UserView::from(&user)))
}

pub async fn list_users_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<UserView>>, AppError> {
    let users = state.admin.list_users(&admin, Utc::now()).await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}
