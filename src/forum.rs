use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::MAX_POST_CONTENT_LENGTH;
use crate::errors::AppError;
use crate::models::{NewSubmission, Post, User};
use crate::moderation::{content_filter, BanState, SanctionLedger, SanctionOutcome};
use crate::repositories::PostRepository;
use crate::utils::PaginationParams;

/// Body of a post or reply submission.
#[derive(Deserialize, Debug, Clone)]
pub struct SubmissionPayload {
    pub content: String,
    /// Client display timestamp; server time when absent.
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmissionResult {
    /// Content passed the filter and was stored.
    Created { post: Post },
    /// Content was flagged; nothing was stored and a violation was recorded.
    Moderated { sanction: SanctionOutcome },
}

enum Screened {
    Clean(NewSubmission),
    Sanctioned(SanctionOutcome),
}

fn validate_content(content: &str) -> Result<String, AppError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("Content cannot be empty"));
    }
    if trimmed.chars().count() > MAX_POST_CONTENT_LENGTH {
        return Err(AppError::bad_request(format!(
            "Content exceeds maximum length of {} characters",
            MAX_POST_CONTENT_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone)]
pub struct ForumStore {
    posts: Arc<dyn PostRepository>,
    ban_state: BanState,
    ledger: SanctionLedger,
}

impl ForumStore {
    pub fn new(posts: Arc<dyn PostRepository>, ban_state: BanState, ledger: SanctionLedger) -> Self {
        Self {
            posts,
            ban_state,
            ledger,
        }
    }

    pub async fn list(&self, pagination: &PaginationParams) -> Result<Vec<Post>, AppError> {
        Ok(self.posts.list_posts(pagination).await?)
    }

    pub async fn get(&self, post_id: Uuid) -> Result<Post, AppError> {
        self.posts
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))
    }

    /// Ban check, validation, then the content filter. A clean submission is
    /// passed back for storing, a flagged one has already been sanctioned.
    async fn screen(
        &self,
        author: &User,
        payload: SubmissionPayload,
        now: DateTime<Utc>,
        target: Option<Uuid>,
    ) -> Result<Screened, AppError> {
        self.ban_state.ensure_not_blocked(&author.username, now).await?;
        let content = validate_content(&payload.content)?;

        // A missing target must not cost the author a warning.
        if let Some(post_id) = target {
            self.get(post_id).await?;
        }

        let scan = content_filter::scan(&content);
        if scan.flagged {
            warn!(
                username = %author.username,
                matched = ?scan.matched_terms,
                "Submission flagged by content filter"
            );
            let outcome = self
                .ledger
                .record_violation(&author.username, &scan.matched_terms, now)
                .await?;
            return Ok(Screened::Sanctioned(outcome));
        }

        Ok(Screened::Clean(NewSubmission {
            author: author.username.clone(),
            content,
            timestamp: payload
                .timestamp
                .filter(|ts| !ts.trim().is_empty())
                .unwrap_or_else(|| now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }))
    }

    pub async fn submit_post(
        &self,
        author: &User,
        payload: SubmissionPayload,
        now: DateTime<Utc>,
    ) -> Result<SubmissionResult, AppError> {
        match self.screen(author, payload, now, None).await? {
            Screened::Sanctioned(sanction) => Ok(SubmissionResult::Moderated { sanction }),
            Screened::Clean(submission) => {
                let post = self.posts.create_post(submission).await?;
                info!(post_id = %post.id, author = %post.author, "Post created");
                Ok(SubmissionResult::Created { post })
            }
        }
    }

    pub async fn submit_reply(
        &self,
        author: &User,
        post_id: Uuid,
        payload: SubmissionPayload,
        now: DateTime<Utc>,
    ) -> Result<SubmissionResult, AppError> {
        match self.screen(author, payload, now, Some(post_id)).await? {
            Screened::Sanctioned(sanction) => Ok(SubmissionResult::Moderated { sanction }),
            Screened::Clean(submission) => {
                let post = self
                    .posts
                    .add_reply(post_id, submission)
                    .await?
                    .ok_or_else(|| AppError::not_found("Post not found"))?;
                info!(post_id = %post.id, author = %author.username, "Reply added");
                Ok(SubmissionResult::Created { post })
            }
        }
    }

    /// Idempotent: a second like from the same user changes nothing.
    pub async fn like(&self, post_id: Uuid, username: &str) -> Result<Post, AppError> {
        self.posts
            .like_post(post_id, username)
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))
    }

    pub async fn like_reply(
        &self,
        post_id: Uuid,
        reply_id: Uuid,
        username: &str,
    ) -> Result<Post, AppError> {
        self.posts
            .like_reply(post_id, reply_id, username)
            .await?
            .ok_or_else(|| AppError::not_found("Reply not found"))
    }

    /// Deletes a post and its replies. Only the author or an admin may.
    pub async fn delete(&self, post_id: Uuid, requester: &User) -> Result<(), AppError> {
        let post = self.get(post_id).await?;
        if post.author != requester.username && !requester.is_admin() {
            warn!(post_id = %post_id, username = %requester.username, "Delete denied");
            return Err(AppError::forbidden("Only the author or an admin can delete this post"));
        }

        if self.posts.delete_post(post_id).await? == 0 {
            return Err(AppError::not_found("Post not found"));
        }
        info!(post_id = %post_id, username = %requester.username, "Post deleted");
        Ok(())
    }
}
