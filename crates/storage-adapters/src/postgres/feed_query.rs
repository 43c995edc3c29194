//! Parameterized feed queries.
//!
//! The page query and the count query share `push_scope`, so both always
//! filter on the exact same predicate. User input only ever reaches the
//! database through bind parameters.

use domains::{FeedQuery, FeedScope, SortMode};
use sqlx::{Postgres, QueryBuilder};

/// Engagement counts use `COUNT(DISTINCT ..)` per table so a post with several
/// likes and several comments is not multiplied by the join fan-out.
const SCOPED_POSTS: &str = "WITH scoped AS (\
SELECT p.id, p.post_title, p.post_content, p.post_owner_id, p.post_community_id, \
p.post_created_at, p.post_updated_at, \
COUNT(DISTINCT pl.liked_by_id) AS like_count, \
COUNT(DISTINCT pc.id) AS comment_count, \
COUNT(DISTINCT pb.bookmarked_by_id) AS bookmark_count \
FROM posts AS p \
LEFT JOIN post_likes AS pl ON pl.liked_post_id = p.id \
LEFT JOIN post_comments AS pc ON pc.post_id = p.id AND pc.parent_comment_id IS NULL \
LEFT JOIN post_bookmarks AS pb ON pb.bookmarked_post_id = p.id \
WHERE ";

/// Appends the eligibility predicate for `scope`, written against `posts AS p`.
pub(crate) fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: &FeedScope) {
    match scope {
        FeedScope::Community {
            community_id,
            search,
        } => {
            qb.push("p.post_community_id = ");
            qb.push_bind(*community_id);
            if let Some(term) = search {
                qb.push(" AND p.post_title ILIKE ");
                qb.push_bind(term.like_pattern());
            }
        }
        FeedScope::Member { user_id, top_n } => {
            qb.push(
                "p.post_community_id IN (\
SELECT mine.community_id FROM user_communities AS mine \
INNER JOIN user_communities AS peers ON peers.community_id = mine.community_id \
WHERE mine.user_id = ",
            );
            qb.push_bind(*user_id);
            qb.push(
                " GROUP BY mine.community_id \
ORDER BY COUNT(DISTINCT peers.user_id) DESC, mine.community_id ASC LIMIT ",
            );
            qb.push_bind(i64::from(*top_n));
            qb.push(")");
        }
        FeedScope::Global { top_n } => {
            qb.push(
                "p.post_community_id IN (\
SELECT uc.community_id FROM user_communities AS uc \
GROUP BY uc.community_id \
ORDER BY COUNT(DISTINCT uc.user_id) DESC, uc.community_id ASC LIMIT ",
            );
            qb.push_bind(i64::from(*top_n));
            qb.push(")");
        }
    }
}

fn sort_key(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Newest => "post_created_at",
        SortMode::Top => "like_count",
        SortMode::Relevance => "activity_score",
    }
}

/// One window of scored, sorted posts.
pub(crate) fn page_query(query: &FeedQuery) -> QueryBuilder<'static, Postgres> {
    let weights = query.score.weights;
    let mut qb = QueryBuilder::new(SCOPED_POSTS);
    push_scope(&mut qb, &query.scope);
    qb.push(" GROUP BY p.id) SELECT scoped.*, ((");
    qb.push_bind(weights.like);
    qb.push(" * like_count + ");
    qb.push_bind(weights.comment);
    qb.push(" * comment_count + ");
    qb.push_bind(weights.bookmark);
    qb.push(" * bookmark_count) / POWER(GREATEST(EXTRACT(EPOCH FROM (");
    qb.push_bind(query.now);
    qb.push(" - post_created_at))::float8 / 60.0, ");
    qb.push_bind(query.score.min_age_minutes);
    qb.push("), 2)) AS activity_score FROM scoped ORDER BY ");
    qb.push(sort_key(query.sort));
    qb.push(" DESC, id DESC LIMIT ");
    qb.push_bind(i64::from(query.page.limit()));
    qb.push(" OFFSET ");
    // Offset is at most (u32::MAX - 1) * u32::MAX, well inside i64.
    qb.push_bind(query.page.offset() as i64);
    qb
}

/// Cardinality of the scope: no metrics, no scoring, no window.
pub(crate) fn count_query(scope: &FeedScope) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts AS p WHERE ");
    push_scope(&mut qb, scope);
    qb
}
