//! # Domain Models
//!
//! These structs represent the entities the feed engine reads.
//! Posts, images and users carry UUID v7 ids, so id order follows creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A post inside a community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub owner_id: Uuid,
    pub community_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Engagement counts derived at query time, never stored.
///
/// `comment_count` only covers top-level comments; replies are excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub like_count: i64,
    pub comment_count: i64,
    pub bookmark_count: i64,
}

/// A post that passed scope filtering, with its metrics and the activity
/// score computed against the request's "now".
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPost {
    pub post: Post,
    pub metrics: PostMetrics,
    pub activity_score: f64,
}

/// The public slice of a user profile attached to each post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub user_image: Option<String>,
}

/// An image attached to a post (one post, many images).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    pub id: Uuid,
    pub post_id: Uuid,
    pub url: String,
}

/// A fully assembled feed entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostWithMetrics {
    #[serde(flatten)]
    pub post: Post,
    pub owner: OwnerSummary,
    pub images: Vec<PostImage>,
    #[serde(flatten)]
    pub metrics: PostMetrics,
    pub activity_score: f64,
}

/// What the content store returns for one feed request: the ranked rows of
/// the requested window plus the cardinality of the whole scope, both read
/// from the same snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSlice {
    pub rows: Vec<RankedPost>,
    pub total: u64,
}

/// One page of a feed, ready for the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPage {
    pub posts: Vec<PostWithMetrics>,
    pub total: u64,
    pub total_pages: u64,
    pub page: u32,
    pub limit: u32,
}
