//! # Postgres adapters
//!
//! `PgFeedRepository` serves the ranked feed queries, `PgUserDirectory` the
//! owner lookups. Both share one `PgPool`.

mod feed_query;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use domains::{
    FeedQuery, FeedRepository, FeedSlice, OwnerSummary, Post, PostImage, PostMetrics, RankedPost,
    UserDirectory,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

/// Pool sizing, usually taken from the `database` settings section.
#[derive(Debug, Clone)]
pub struct PgPoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens a connection pool.
pub async fn connect(url: &str, config: &PgPoolConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(url)
        .await
        .context("connecting to postgres")?;
    info!(max_connections = config.max_connections, "postgres pool ready");
    Ok(pool)
}

/// Applies the bundled schema migrations.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running migrations")?;
    Ok(())
}

#[derive(Clone)]
pub struct PgFeedRepository {
    pool: PgPool,
}

impl PgFeedRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn ranked_post(row: &PgRow) -> Result<RankedPost, sqlx::Error> {
    Ok(RankedPost {
        post: Post {
            id: row.try_get("id")?,
            title: row.try_get("post_title")?,
            content: row.try_get("post_content")?,
            owner_id: row.try_get("post_owner_id")?,
            community_id: row.try_get("post_community_id")?,
            created_at: row.try_get("post_created_at")?,
            updated_at: row.try_get("post_updated_at")?,
        },
        metrics: PostMetrics {
            like_count: row.try_get("like_count")?,
            comment_count: row.try_get("comment_count")?,
            bookmark_count: row.try_get("bookmark_count")?,
        },
        activity_score: row.try_get("activity_score")?,
    })
}

fn id_list<'a>(qb: &mut QueryBuilder<'a, Postgres>, ids: &[Uuid]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    qb.push(")");
}

#[async_trait]
impl FeedRepository for PgFeedRepository {
    async fn community_exists(&self, community_id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM communities WHERE id = $1)")
            .bind(community_id)
            .fetch_one(&self.pool)
            .await
            .context("checking community")?;
        Ok(exists)
    }

    /// Runs the page and the count inside one read-only REPEATABLE READ
    /// transaction so concurrent writes cannot make them disagree.
    async fn fetch_feed(&self, query: &FeedQuery) -> anyhow::Result<FeedSlice> {
        let mut tx = self.pool.begin().await.context("opening feed snapshot")?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .context("setting snapshot isolation")?;

        let mut page = feed_query::page_query(query);
        let rows = page
            .build()
            .fetch_all(&mut *tx)
            .await
            .context("fetching feed page")?
            .iter()
            .map(ranked_post)
            .collect::<Result<Vec<_>, _>>()
            .context("decoding feed row")?;

        let mut count = feed_query::count_query(&query.scope);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await
            .context("counting feed scope")?;

        tx.commit().await.context("closing feed snapshot")?;

        debug!(scope = query.scope.kind(), rows = rows.len(), total, "feed slice loaded");
        Ok(FeedSlice {
            rows,
            total: u64::try_from(total).context("negative feed count")?,
        })
    }

    async fn images_for_posts(&self, post_ids: &[Uuid]) -> anyhow::Result<Vec<PostImage>> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, post_image_url, post_id FROM post_images WHERE post_id IN (",
        );
        id_list(&mut qb, post_ids);
        qb.push(" ORDER BY id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("fetching post images")?;

        rows.iter()
            .map(|row| -> Result<PostImage, sqlx::Error> {
                Ok(PostImage {
                    id: row.try_get("id")?,
                    post_id: row.try_get("post_id")?,
                    url: row.try_get("post_image_url")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("decoding post image")
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn user_exists(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("checking user")?;
        Ok(exists)
    }

    async fn owner_summaries(&self, user_ids: &[Uuid]) -> anyhow::Result<Vec<OwnerSummary>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb =
            QueryBuilder::<Postgres>::new("SELECT id, username, user_image FROM users WHERE id IN (");
        id_list(&mut qb, user_ids);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("fetching post owners")?;

        rows.iter()
            .map(|row| -> Result<OwnerSummary, sqlx::Error> {
                Ok(OwnerSummary {
                    id: row.try_get("id")?,
                    username: row.try_get("username")?,
                    user_image: row.try_get("user_image")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .context("decoding post owner")
    }
}
