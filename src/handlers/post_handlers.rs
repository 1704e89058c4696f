use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    errors::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    forum::{SubmissionPayload, SubmissionResult},
    models::Post,
    utils::PaginationParams,
    AppState,
};

fn submission_response(result: SubmissionResult) -> Response {
    let status = match result {
        SubmissionResult::Created { .. } => StatusCode::CREATED,
        SubmissionResult::Moderated { .. } => StatusCode::OK,
    };
    (status, Json(result)).into_response()
}

/// Newest posts first, with their replies.
pub async fn list_posts_handler(
    State(state): State<AppState>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> Result<Json<Vec<Post>>, AppError> {
    let posts = state.forum.list(&pagination).await?;
    debug!(count = posts.len(), "Listed posts");
    Ok(Json(posts))
}

pub async fn get_post_handler(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.forum.get(post_id).await?))
}

/// Creates a post, or records a violation when the content is flagged.
pub async fn create_post_handler(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(payload): ApiJson<SubmissionPayload>,
) -> Result<Response, AppError> {
    let result = state.forum.submit_post(&user, payload, Utc::now()).await?;
    Ok(submission_response(result))
}

pub async fn create_reply_handler(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
    AuthenticatedUser(user): AuthenticatedUser,
    ApiJson(payload): ApiJson<SubmissionPayload>,
) -> Result<Response, AppError> {
    let result = state
        .forum
        .submit_reply(&user, post_id, payload, Utc::now())
        .await?;
    Ok(submission_response(result))
}

pub async fn like_post_handler(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Post>, AppError> {
    Ok(Json(state.forum.like(post_id, &user.username).await?))
}

pub async fn like_reply_handler(
    State(state): State<AppState>,
    ApiPath((post_id, reply_id)): ApiPath<(Uuid, Uuid)>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Post>, AppError> {
    Ok(Json(
        state
            .forum
            .like_reply(post_id, reply_id, &user.username)
            .await?,
    ))
}

/// Deletes a post with its replies; author or admin only.
pub async fn delete_post_handler(
    State(state): State<AppState>,
    ApiPath(post_id): ApiPath<Uuid>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    state.forum.delete(post_id, &user).await?;
    Ok(Json(json!({ "ok": true })))
}
