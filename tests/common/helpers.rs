//! Shared helpers for the HTTP integration tests. Everything runs against the
//! in-memory repositories.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use moderation_server::{
    auth::issue_token,
    config::Config,
    create_router,
    models::{LedgerState, NewUser, Role, User},
    repositories::{LedgerUpdate, Repositories},
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// App with members `alice` and `bob` and admin `root`.
pub async fn create_test_app() -> TestApp {
    let state = AppState::new(Repositories::in_memory(), Config::for_tests());
    for (username, role) in [("alice", Role::User), ("bob", Role::User), ("root", Role::Admin)] {
        state
            .users
            .create_user(NewUser { username: username.to_string(), role })
            .await
            .unwrap();
    }
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

impl TestApp {
    pub fn token(&self, username: &str) -> String {
        issue_token(
            &self.state.config.token_secret,
            username,
            Duration::hours(1),
            Utc::now(),
        )
    }

    pub async fn user(&self, username: &str) -> User {
        self.state.users.get_user(username).await.unwrap().unwrap()
    }

    /// Overwrites a user's ledger, bypassing the moderation services.
    pub async fn set_ledger(&self, username: &str, ledger: LedgerState) -> User {
        let current = self.user(username).await;
        match self
            .state
            .users
            .update_ledger(username, current.ledger_version, ledger)
            .await
            .unwrap()
        {
            LedgerUpdate::Applied(user) => user,
            other => panic!("ledger update not applied: {:?}", other),
        }
    }

    /// Sends a request, returning the status and the body parsed as JSON
    /// (or as a JSON string when it is not JSON).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }
}
