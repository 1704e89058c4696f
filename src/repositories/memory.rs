use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use super::{LedgerUpdate, PostRepository, RepositoryError, UserRepository};
use crate::models::{BanStatus, LedgerState, NewSubmission, NewUser, Post, Reply, User};
use crate::utils::PaginationParams;

/// In-process user store. Ledger writes happen under the entry's shard lock,
/// which gives the same compare-and-swap semantics as the SQL version.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: DashMap<String, User>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get_user(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(username).map(|u| u.value().clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(user.username)),
            Entry::Vacant(slot) => {
                let created = User {
                    username: user.username,
                    role: user.role,
                    forum_warnings: 0,
                    ban: BanStatus::NotBanned,
                    ledger_version: 0,
                    created_at: Utc::now(),
                };
                slot.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn update_ledger(
        &self,
        username: &str,
        expected_version: i64,
        ledger: LedgerState,
    ) -> Result<LedgerUpdate, RepositoryError> {
        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(LedgerUpdate::Missing);
        };
        if user.ledger_version != expected_version {
            return Ok(LedgerUpdate::Stale);
        }
        user.forum_warnings = ledger.forum_warnings;
        user.ban = ledger.ban;
        user.ledger_version += 1;
        Ok(LedgerUpdate::Applied(user.clone()))
    }
}

/// In-process post store, newest first by insertion sequence.
#[derive(Default)]
pub struct MemoryPostRepository {
    posts: DashMap<Uuid, (u64, Post)>,
    next_seq: AtomicU64,
}

impl MemoryPostRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostRepository for MemoryPostRepository {
    async fn list_posts(&self, pagination: &PaginationParams) -> Result<Vec<Post>, RepositoryError> {
        let mut posts: Vec<(u64, Post)> = self.posts.iter().map(|p| p.value().clone()).collect();
        posts.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(posts
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit()).unwrap_or(usize::MAX))
            .map(|(_, post)| post)
            .collect())
    }

    async fn get_post(&self, post_id: Uuid) -> Result<Option<Post>, RepositoryError> {
        Ok(self.posts.get(&post_id).map(|p| p.value().1.clone()))
    }

    async fn create_post(&self, post: NewSubmission) -> Result<Post, RepositoryError> {
        let created = Post {
            id: Uuid::new_v4(),
            author: post.author,
            content: post.content,
            timestamp: post.timestamp,
            created_at: Utc::now(),
            likes: 0,
            liked_by: Vec::new(),
            replies: Vec::new(),
            is_moderated: false,
            moderation_reason: None,
        };
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.posts.insert(created.id, (seq, created.clone()));
        Ok(created)
    }

    async fn add_reply(
        &self,
        post_id: Uuid,
        reply: NewSubmission,
    ) -> Result<Option<Post>, RepositoryError> {
        let Some(mut entry) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        let post = &mut entry.1;
        post.replies.push(Reply {
            id: Uuid::new_v4(),
            author: reply.author,
            content: reply.content,
            timestamp: reply.timestamp,
            created_at: Utc::now(),
            likes: 0,
            liked_by: Vec::new(),
            is_moderated: false,
            moderation_reason: None,
        });
        Ok(Some(post.clone()))
    }

    async fn like_post(&self, post_id: Uuid, username: &str) -> Result<Option<Post>, RepositoryError> {
        let Some(mut entry) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        let post = &mut entry.1;
        if !post.liked_by.iter().any(|u| u == username) {
            post.liked_by.push(username.to_string());
            post.likes += 1;
        }
        Ok(Some(post.clone()))
    }

    async fn like_reply(
        &self,
        post_id: Uuid,
        reply_id: Uuid,
        username: &str,
    ) -> Result<Option<Post>, RepositoryError> {
        let Some(mut entry) = self.posts.get_mut(&post_id) else {
            return Ok(None);
        };
        let post = &mut entry.1;
        let Some(reply) = post.replies.iter_mut().find(|r| r.id == reply_id) else {
            return Ok(None);
        };
        if !reply.liked_by.iter().any(|u| u == username) {
            reply.liked_by.push(username.to_string());
            reply.likes += 1;
        }
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, post_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(self.posts.remove(&post_id).map_or(0, |_| 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn submission(author: &str, content: &str) -> NewSubmission {
        NewSubmission {
            author: author.into(),
            content: content.into(),
            timestamp: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_user_is_a_conflict() {
        let repo = MemoryUserRepository::new();
        let new_user = NewUser { username: "kim".into(), role: Role::User };
        repo.create_user(new_user.clone()).await.unwrap();
        let err = repo.create_user(new_user).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(name) if name == "kim"));
    }

    #[tokio::test]
    async fn stale_ledger_write_is_refused() {
        let repo = MemoryUserRepository::new();
        let user = repo
            .create_user(NewUser { username: "kim".into(), role: Role::User })
            .await
            .unwrap();
        let next = LedgerState { forum_warnings: 1, ban: BanStatus::NotBanned };

        let first = repo.update_ledger("kim", user.ledger_version, next).await.unwrap();
        assert!(matches!(first, LedgerUpdate::Applied(ref u) if u.ledger_version == 1));

        let second = repo.update_ledger("kim", user.ledger_version, next).await.unwrap();
        assert_eq!(second, LedgerUpdate::Stale);

        let missing = repo.update_ledger("nobody", 0, next).await.unwrap();
        assert_eq!(missing, LedgerUpdate::Missing);
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first() {
        let repo = MemoryPostRepository::new();
        let first = repo.create_post(submission("a", "first")).await.unwrap();
        let second = repo.create_post(submission("b", "second")).await.unwrap();

        let listed = repo.list_posts(&PaginationParams::default()).await.unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let page = repo.list_posts(&PaginationParams::new(1, 1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first.id);

        let past_end = repo.list_posts(&PaginationParams::new(10, u64::MAX)).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn likes_are_counted_once_per_user() {
        let repo = MemoryPostRepository::new();
        let post = repo.create_post(submission("a", "hello there")).await.unwrap();

        repo.like_post(post.id, "b").await.unwrap();
        let liked = repo.like_post(post.id, "b").await.unwrap().unwrap();
        assert_eq!(liked.likes, 1);
        assert_eq!(liked.liked_by, vec!["b".to_string()]);

        assert!(repo.like_post(Uuid::new_v4(), "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_post_drops_its_replies() {
        let repo = MemoryPostRepository::new();
        let post = repo.create_post(submission("a", "topic")).await.unwrap();
        let with_reply = repo
            .add_reply(post.id, submission("b", "answer"))
            .await
            .unwrap()
            .unwrap();
        let reply_id = with_reply.replies[0].id;

        assert_eq!(repo.delete_post(post.id).await.unwrap(), 1);
        assert!(repo.posts.is_empty());
        assert!(repo.like_reply(post.id, reply_id, "c").await.unwrap().is_none());
        assert_eq!(repo.delete_post(post.id).await.unwrap(), 0);
    }
}
