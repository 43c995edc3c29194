//! Attaches owners and images to a ranked page.
//!
//! Both lookups are batched by the page's ids and run concurrently, then
//! joined back in memory in page order.

use std::collections::HashMap;

use domains::{
    FeedError, FeedRepository, OwnerSummary, PostImage, PostWithMetrics, RankedPost, Result,
    UserDirectory,
};
use tracing::error;
use uuid::Uuid;

pub(crate) async fn assemble(
    repo: &dyn FeedRepository,
    users: &dyn UserDirectory,
    rows: Vec<RankedPost>,
) -> Result<Vec<PostWithMetrics>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let post_ids: Vec<Uuid> = rows.iter().map(|row| row.post.id).collect();
    let mut owner_ids: Vec<Uuid> = rows.iter().map(|row| row.post.owner_id).collect();
    owner_ids.sort_unstable();
    owner_ids.dedup();

    let (images, owners) = tokio::try_join!(
        repo.images_for_posts(&post_ids),
        users.owner_summaries(&owner_ids),
    )
    .map_err(|err| {
        error!(error = ?err, "failed to load images or owners for feed page");
        FeedError::data_access(err.context("loading page attachments"))
    })?;

    let mut images_by_post: HashMap<Uuid, Vec<PostImage>> = HashMap::with_capacity(rows.len());
    for image in images {
        images_by_post.entry(image.post_id).or_default().push(image);
    }
    let owners: HashMap<Uuid, OwnerSummary> =
        owners.into_iter().map(|owner| (owner.id, owner)).collect();

    rows.into_iter()
        .map(|row| {
            let owner = owners.get(&row.post.owner_id).cloned().ok_or_else(|| {
                error!(post_id = %row.post.id, owner_id = %row.post.owner_id, "post owner missing");
                FeedError::Internal(format!("owner {} of post {} missing", row.post.owner_id, row.post.id))
            })?;
            let images = images_by_post.remove(&row.post.id).unwrap_or_default();
            Ok(PostWithMetrics {
                post: row.post,
                owner,
                images,
                metrics: row.metrics,
                activity_score: row.activity_score,
            })
        })
        .collect()
}
