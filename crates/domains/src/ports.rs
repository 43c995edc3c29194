//! # Core Traits (Ports)
//!
//! Adapters implement these traits; the feed engine only talks to them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::FeedError;
use crate::feed::FeedQuery;
use crate::models::{FeedSlice, OwnerSummary, PostImage};

/// Read access to the content store (communities, posts, engagement,
/// memberships). Writes belong to other services.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn community_exists(&self, community_id: Uuid) -> anyhow::Result<bool>;

    /// Returns the requested window of ranked posts and the total size of
    /// the scope. Both must be read from the same snapshot.
    async fn fetch_feed(&self, query: &FeedQuery) -> anyhow::Result<FeedSlice>;

    /// Images of all given posts in one round-trip, ordered by image id.
    async fn images_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<PostImage>>;
}

/// Profile lookups.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> anyhow::Result<bool>;

    /// Owner summaries for all given ids in one round-trip. Unknown ids are
    /// simply absent from the result.
    async fn owner_summaries(&self, user_ids: &[Uuid]) -> anyhow::Result<Vec<OwnerSummary>>;
}

/// Turns a bearer credential into the id of the authenticated user.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Uuid, FeedError>;
}

/// Source of "now" for score computation.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
