pub mod moderation_handlers;
pub mod post_handlers;
pub mod user_handlers;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
