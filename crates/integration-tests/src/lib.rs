//! Shared fixtures for the integration suites: an in-memory content store,
//! a frozen clock and helpers to seed communities, posts and engagement.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use domains::FixedClock;
use services::{FeedConfig, FeedService};
use storage_adapters::MemoryStore;
use uuid::Uuid;

/// 2024-05-01T12:00:00Z
const FROZEN_AT: i64 = 1_714_564_800;

pub struct World {
    pub store: Arc<MemoryStore>,
    pub now: DateTime<Utc>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            now: DateTime::from_timestamp(FROZEN_AT, 0).unwrap_or_default(),
        }
    }

    pub fn service(&self) -> FeedService {
        self.service_with(FeedConfig::default())
    }

    pub fn service_with(&self, config: FeedConfig) -> FeedService {
        FeedService::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(FixedClock(self.now)),
            config,
        )
    }

    pub fn minutes_ago(&self, minutes: i64) -> DateTime<Utc> {
        self.now - Duration::minutes(minutes)
    }

    pub async fn user(&self, name: &str) -> Uuid {
        self.store.add_user(name).await
    }

    /// A community with `members` fresh members.
    pub async fn community(&self, name: &str, members: usize) -> anyhow::Result<Uuid> {
        let id = self.store.add_community(name).await;
        for i in 0..members {
            let user = self.store.add_user(&format!("{name}-member-{i}")).await;
            self.store.join_community(user, id).await?;
        }
        Ok(id)
    }

    pub async fn post(
        &self,
        owner: Uuid,
        community: Uuid,
        title: &str,
        age_minutes: i64,
    ) -> anyhow::Result<Uuid> {
        self.store
            .add_post(owner, community, title, "body", self.minutes_ago(age_minutes))
            .await
    }

    /// Adds engagement from fresh users, one per like, comment and bookmark.
    pub async fn engage(
        &self,
        post: Uuid,
        likes: usize,
        comments: usize,
        bookmarks: usize,
    ) -> anyhow::Result<()> {
        for _ in 0..likes {
            let user = self.store.add_user("liker").await;
            self.store.like_post(user, post).await?;
        }
        for _ in 0..comments {
            let user = self.store.add_user("commenter").await;
            self.store.add_comment(user, post, None).await?;
        }
        for _ in 0..bookmarks {
            let user = self.store.add_user("bookmarker").await;
            self.store.bookmark_post(user, post).await?;
        }
        Ok(())
    }
}
