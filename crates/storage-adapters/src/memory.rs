//! # In-memory content store
//!
//! Implements the same feed semantics as the Postgres adapter on plain
//! collections. Every read takes one lock guard, which gives page and count
//! the same snapshot. Used by tests and by local runs without a database.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    activity_score, top_communities, FeedQuery, FeedRepository, FeedScope, FeedSlice,
    OwnerSummary, Post, PostImage, PostMetrics, RankedPost, UserDirectory,
};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Comment {
    post_id: Uuid,
    parent_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, OwnerSummary>,
    communities: HashMap<Uuid, String>,
    /// community id -> member ids
    members: HashMap<Uuid, HashSet<Uuid>>,
    posts: HashMap<Uuid, Post>,
    images: Vec<PostImage>,
    /// (user id, post id)
    likes: HashSet<(Uuid, Uuid)>,
    /// (user id, post id)
    bookmarks: HashSet<(Uuid, Uuid)>,
    comments: HashMap<Uuid, Comment>,
}

impl State {
    fn metrics(&self, post_id: Uuid) -> PostMetrics {
        let count = |n: usize| n as i64;
        PostMetrics {
            like_count: count(self.likes.iter().filter(|(_, p)| *p == post_id).count()),
            comment_count: count(
                self.comments
                    .values()
                    .filter(|c| c.post_id == post_id && c.parent_id.is_none())
                    .count(),
            ),
            bookmark_count: count(self.bookmarks.iter().filter(|(_, p)| *p == post_id).count()),
        }
    }

    /// Communities whose posts are eligible for `scope`.
    fn eligible_communities(&self, scope: &FeedScope) -> HashSet<Uuid> {
        match scope {
            FeedScope::Community { community_id, .. } => HashSet::from([*community_id]),
            FeedScope::Member { user_id, top_n } => {
                let joined = self
                    .members
                    .iter()
                    .filter(|(_, members)| members.contains(user_id))
                    .map(|(id, members)| (*id, members.len() as u64));
                top_communities(joined, *top_n).into_iter().collect()
            }
            FeedScope::Global { top_n } => {
                let all = self
                    .members
                    .iter()
                    .map(|(id, members)| (*id, members.len() as u64));
                top_communities(all, *top_n).into_iter().collect()
            }
        }
    }

    fn in_scope(&self, post: &Post, scope: &FeedScope, communities: &HashSet<Uuid>) -> bool {
        if !communities.contains(&post.community_id) {
            return false;
        }
        match scope {
            FeedScope::Community {
                search: Some(term), ..
            } => term.matches(&post.title),
            _ => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, username: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.state.write().await.users.insert(
            id,
            OwnerSummary {
                id,
                username: Some(username.to_string()),
                user_image: None,
            },
        );
        id
    }

    pub async fn add_community(&self, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.state
            .write()
            .await
            .communities
            .insert(id, name.to_string());
        id
    }

    pub async fn join_community(&self, user_id: Uuid, community_id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        ensure!(state.users.contains_key(&user_id), "unknown user {user_id}");
        ensure!(
            state.communities.contains_key(&community_id),
            "unknown community {community_id}"
        );
        state.members.entry(community_id).or_default().insert(user_id);
        Ok(())
    }

    pub async fn leave_community(&self, user_id: Uuid, community_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(members) = state.members.get_mut(&community_id) {
            members.remove(&user_id);
            if members.is_empty() {
                state.members.remove(&community_id);
            }
        }
    }

    pub async fn add_post(
        &self,
        owner_id: Uuid,
        community_id: Uuid,
        title: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<Uuid> {
        let mut state = self.state.write().await;
        ensure!(state.users.contains_key(&owner_id), "unknown user {owner_id}");
        ensure!(
            state.communities.contains_key(&community_id),
            "unknown community {community_id}"
        );
        let id = Uuid::now_v7();
        state.posts.insert(
            id,
            Post {
                id,
                title: title.to_string(),
                content: content.to_string(),
                owner_id,
                community_id,
                created_at,
                updated_at: None,
            },
        );
        Ok(id)
    }

    pub async fn add_post_image(&self, post_id: Uuid, url: &str) -> anyhow::Result<Uuid> {
        let mut state = self.state.write().await;
        ensure!(state.posts.contains_key(&post_id), "unknown post {post_id}");
        let id = Uuid::now_v7();
        state.images.push(PostImage {
            id,
            post_id,
            url: url.to_string(),
        });
        Ok(id)
    }

    /// Likes are per user; liking twice is a no-op.
    pub async fn like_post(&self, user_id: Uuid, post_id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        ensure!(state.posts.contains_key(&post_id), "unknown post {post_id}");
        state.likes.insert((user_id, post_id));
        Ok(())
    }

    pub async fn bookmark_post(&self, user_id: Uuid, post_id: Uuid) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        ensure!(state.posts.contains_key(&post_id), "unknown post {post_id}");
        state.bookmarks.insert((user_id, post_id));
        Ok(())
    }

    /// Adds a comment; `parent_id` makes it a reply.
    pub async fn add_comment(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> anyhow::Result<Uuid> {
        let mut state = self.state.write().await;
        ensure!(state.users.contains_key(&user_id), "unknown user {user_id}");
        ensure!(state.posts.contains_key(&post_id), "unknown post {post_id}");
        if let Some(parent) = parent_id {
            match state.comments.get(&parent) {
                Some(c) if c.post_id == post_id => {}
                Some(_) => bail!("comment {parent} belongs to another post"),
                None => bail!("unknown comment {parent}"),
            }
        }
        let id = Uuid::now_v7();
        state.comments.insert(id, Comment { post_id, parent_id });
        Ok(id)
    }
}

#[async_trait]
impl FeedRepository for MemoryStore {
    async fn community_exists(&self, community_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.state.read().await.communities.contains_key(&community_id))
    }

    async fn fetch_feed(&self, query: &FeedQuery) -> anyhow::Result<FeedSlice> {
        let state = self.state.read().await;
        let communities = state.eligible_communities(&query.scope);

        let mut ranked: Vec<RankedPost> = state
            .posts
            .values()
            .filter(|post| state.in_scope(post, &query.scope, &communities))
            .map(|post| {
                let metrics = state.metrics(post.id);
                RankedPost {
                    activity_score: activity_score(&metrics, post.created_at, query.now, &query.score),
                    post: post.clone(),
                    metrics,
                }
            })
            .collect();
        ranked.sort_by(|a, b| query.sort.compare(a, b));

        let total = ranked.len() as u64;
        let rows = ranked
            .into_iter()
            .skip(usize::try_from(query.page.offset()).unwrap_or(usize::MAX))
            .take(query.page.limit() as usize)
            .collect();

        Ok(FeedSlice { rows, total })
    }

    async fn images_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<PostImage>> {
        let wanted: HashSet<&Uuid> = post_ids.iter().collect();
        let state = self.state.read().await;
        let mut images: Vec<PostImage> = state
            .images
            .iter()
            .filter(|image| wanted.contains(&image.post_id))
            .cloned()
            .collect();
        images.sort_by_key(|image| image.id);
        Ok(images)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_exists(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.state.read().await.users.contains_key(&user_id))
    }

    async fn owner_summaries(&self, user_ids: &[Uuid]) -> anyhow::Result<Vec<OwnerSummary>> {
        let state = self.state.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}
