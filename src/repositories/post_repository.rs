use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{PostRepository, RepositoryError};
use crate::models::{NewSubmission, Post, Reply};
use crate::utils::PaginationParams;

const POST_COLUMNS: &str =
    "id, author, content, timestamp, created_at, likes, liked_by, is_moderated, moderation_reason";
const REPLY_COLUMNS: &str = "id, post_id, author, content, timestamp, created_at, likes, liked_by, is_moderated, moderation_reason";

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author: String,
    content: String,
    timestamp: String,
    created_at: DateTime<Utc>,
    likes: i32,
    liked_by: Vec<String>,
    is_moderated: bool,
    moderation_reason: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReplyRow {
    id: Uuid,
    post_id: Uuid,
    author: String,
    content: String,
    timestamp: String,
    created_at: DateTime<Utc>,
    likes: i32,
    liked_by: Vec<String>,
    is_moderated: bool,
    moderation_reason: Option<String>,
}

impl PostRow {
    fn into_post(self, replies: Vec<Reply>) -> Post {
        Post {
            id: self.id,
            author: self.author,
            content: self.content,
            timestamp: self.timestamp,
            created_at: self.created_at,
            likes: self.likes,
            liked_by: self.liked_by,
            replies,
            is_moderated: self.is_moderated,
            moderation_reason: self.moderation_reason,
        }
    }
}

impl From<ReplyRow> for Reply {
    fn from(row: ReplyRow) -> Self {
        Reply {
            id: row.id,
            author: row.author,
            content: row.content,
            timestamp: row.timestamp,
            created_at: row.created_at,
            likes: row.likes,
            liked_by: row.liked_by,
            is_moderated: row.is_moderated,
            moderation_reason: row.moderation_reason,
        }
    }
}

/// Posts and replies tables access.
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the replies of every given post, grouped by post id.
    async fn replies_for(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<Reply>>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReplyRow>(&format!(
            "SELECT {} FROM replies WHERE post_id = ANY($1) ORDER BY seq ASC",
            REPLY_COLUMNS
        ))
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Reply>> = HashMap::new();
        for row in rows {
            grouped.entry(row.post_id).or_default().push(row.into());
        }
        Ok(grouped)
    }

    async fn assemble(&self, rows: Vec<PostRow>) -> Result<Vec<Post>, RepositoryError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut replies = self.replies_for(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let post_replies = replies.remove(&row.id).unwrap_or_default();
                row.into_post(post_replies)
            })
            .collect())
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn list_posts(&self, pagination: &PaginationParams) -> Result<Vec<Post>, RepositoryError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            SELECT {}
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
            POST_COLUMNS
        ))
        .bind(i64::try_from(pagination.limit()).unwrap_or(i64::MAX))
        .bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {} FROM posts WHERE id = $1",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.assemble(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create_post(&self, post: NewSubmission) -> Result<Post, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            r#"
            INSERT INTO posts (id, author, content, timestamp)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            POST_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&post.author)
        .bind(&post.content)
        .bind(&post.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_post(Vec::new()))
    }

    async fn add_reply(
        &self,
        post_id: Uuid,
        reply: NewSubmission,
    ) -> Result<Option<Post>, RepositoryError> {
        // Selecting from posts turns a missing parent into zero inserted rows
        // instead of a foreign key violation.
        let result = sqlx::query(
            r#"
            INSERT INTO replies (id, post_id, author, content, timestamp)
            SELECT $1, id, $3, $4, $5 FROM posts WHERE id = $2
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(&reply.author)
        .bind(&reply.content)
        .bind(&reply.timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(post_id).await
    }

    async fn like_post(&self, post_id: Uuid, username: &str) -> Result<Option<Post>, RepositoryError> {
        sqlx::query(
            r#"
            UPDATE posts
            SET liked_by = array_append(liked_by, $2),
                likes = likes + 1
            WHERE id = $1 AND NOT ($2 = ANY(liked_by))
            "#,
        )
        .bind(post_id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        self.get_post(post_id).await
    }

    async fn like_reply(
        &self,
        post_id: Uuid,
        reply_id: Uuid,
        username: &str,
    ) -> Result<Option<Post>, RepositoryError> {
        sqlx::query(
            r#"
            UPDATE replies
            SET liked_by = array_append(liked_by, $3),
                likes = likes + 1
            WHERE id = $1 AND post_id = $2 AND NOT ($3 = ANY(liked_by))
            "#,
        )
        .bind(reply_id)
        .bind(post_id)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(self
            .get_post(post_id)
            .await?
            .filter(|post| post.reply(reply_id).is_some()))
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
