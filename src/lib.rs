use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

pub mod auth;
pub mod config;
pub mod constants;
pub mod errors;
pub mod extract;
pub mod forum;
pub mod handlers;
pub mod models;
pub mod moderation;
pub mod repositories;
pub mod seeder;
pub mod utils;

use config::Config;
use forum::ForumStore;
use handlers::{
    health_handler,
    moderation_handlers::{
        ban_user_handler, list_banned_handler, reset_warnings_handler, unban_user_handler,
        warn_user_handler,
    },
    post_handlers::{
        create_post_handler, create_reply_handler, delete_post_handler, get_post_handler,
        like_post_handler, like_reply_handler, list_posts_handler,
    },
    user_handlers::{list_users_handler, me_handler},
};
use moderation::{BanState, ModerationAdmin, SanctionLedger};
use repositories::{Repositories, UserRepository};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub forum: ForumStore,
    pub ban_state: BanState,
    pub ledger: SanctionLedger,
    pub admin: ModerationAdmin,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(repos: Repositories, config: Config) -> Self {
        let ban_state = BanState::new(repos.users.clone(), config.appeal_url.clone());
        let ledger = SanctionLedger::new(repos.users.clone(), config.appeal_url.clone());
        let admin = ModerationAdmin::new(repos.users.clone(), ban_state.clone(), ledger.clone());
        let forum = ForumStore::new(repos.posts, ban_state.clone(), ledger.clone());

        Self {
            users: repos.users,
            forum,
            ban_state,
            ledger,
            admin,
            config: Arc::new(config),
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                warn!(origin = %origin, "Invalid CORS_ORIGIN, allowing any origin");
                AllowOrigin::from(Any)
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let max_body_bytes = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/me", get(me_handler))
        .route("/auth/users", get(list_users_handler))
        .route("/forum/posts", get(list_posts_handler).post(create_post_handler))
        .route("/forum/posts/:id", get(get_post_handler).delete(delete_post_handler))
        .route("/forum/posts/:id/replies", post(create_reply_handler))
        .route("/forum/posts/:id/like", post(like_post_handler))
        .route("/forum/posts/:id/replies/:reply_id/like", post(like_reply_handler))
        .route("/forum/moderation/warn", post(warn_user_handler))
        .route("/forum/moderation/ban", post(ban_user_handler))
        .route("/forum/moderation/unban", post(unban_user_handler))
        .route("/forum/moderation/reset-warnings", post(reset_warnings_handler))
        .route("/forum/moderation/banned", get(list_banned_handler))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
