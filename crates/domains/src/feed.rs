//! # Feed ranking rules
//!
//! Sort modes, pagination math, scope descriptions and the activity score.
//! Storage adapters translate these into queries; the in-memory adapter
//! evaluates them directly, so both must agree with the functions here.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;
use crate::models::{PostMetrics, RankedPost};

/// Ordering applied after scope filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    /// Creation time, newest first.
    #[serde(rename = "new")]
    Newest,
    /// Like count, highest first.
    #[serde(rename = "top")]
    Top,
    /// Activity score ("hot"), highest first.
    #[default]
    #[serde(rename = "hot")]
    Relevance,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Newest => "new",
            SortMode::Top => "top",
            SortMode::Relevance => "hot",
        }
    }

    /// Full ordering used by in-memory ranking. Ties on the sort key fall
    /// back to post id, descending.
    pub fn compare(&self, a: &RankedPost, b: &RankedPost) -> Ordering {
        let primary = match self {
            SortMode::Newest => b.post.created_at.cmp(&a.post.created_at),
            SortMode::Top => b.metrics.like_count.cmp(&a.metrics.like_count),
            SortMode::Relevance => b.activity_score.total_cmp(&a.activity_score),
        };
        primary.then_with(|| b.post.id.cmp(&a.post.id))
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SortMode::Newest),
            "top" => Ok(SortMode::Top),
            "hot" => Ok(SortMode::Relevance),
            other => Err(FeedError::invalid(format!(
                "sortBy must be one of new, top, hot (got {other:?})"
            ))),
        }
    }
}

/// A validated, 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Validates raw request values. Nothing is clamped: out-of-range input
    /// is rejected so callers never get a page they did not ask for.
    pub fn new(page: i64, limit: i64, max_limit: u32) -> Result<Self, FeedError> {
        if page < 1 {
            return Err(FeedError::invalid(format!("page must be >= 1 (got {page})")));
        }
        if limit < 1 {
            return Err(FeedError::invalid(format!("limit must be >= 1 (got {limit})")));
        }
        if limit > i64::from(max_limit) {
            return Err(FeedError::invalid(format!(
                "limit must be <= {max_limit} (got {limit})"
            )));
        }
        let page = u32::try_from(page)
            .map_err(|_| FeedError::invalid(format!("page is too large (got {page})")))?;

        Ok(Self {
            page,
            limit: limit as u32,
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// `(page - 1) * limit`. Cannot overflow: both factors are u32.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// `ceil(total / limit)`; zero when nothing matches.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }

    /// Number of rows this window holds when the scope has `total` rows.
    pub fn expected_len(&self, total: u64) -> u64 {
        total
            .saturating_sub(self.offset())
            .min(u64::from(self.limit))
    }
}

/// A case-insensitive title filter. Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    raw: String,
    lowered: String,
}

impl SearchTerm {
    /// Trims the input; blank input means "no search".
    pub fn new(input: &str) -> Option<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            lowered: raw.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal substring match, ignoring case.
    pub fn matches(&self, title: &str) -> bool {
        title.to_lowercase().contains(&self.lowered)
    }

    /// `%term%` with LIKE metacharacters escaped (backslash is the escape).
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.raw.len() + 2);
        pattern.push('%');
        for c in self.raw.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

/// Which posts are eligible for a feed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    /// Posts of one community, optionally filtered by title.
    Community {
        community_id: Uuid,
        search: Option<SearchTerm>,
    },
    /// Posts of the `top_n` largest communities the user belongs to.
    Member { user_id: Uuid, top_n: u32 },
    /// Posts of the `top_n` largest communities platform-wide.
    Global { top_n: u32 },
}

impl FeedScope {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedScope::Community { .. } => "community",
            FeedScope::Member { .. } => "user",
            FeedScope::Global { .. } => "global",
        }
    }
}

/// Fixed engagement weights of the activity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub like: f64,
    pub comment: f64,
    pub bookmark: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            like: 0.3,
            comment: 0.5,
            bookmark: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    pub weights: ScoreWeights,
    /// Lower bound for the age term, in minutes. Keeps the score finite for
    /// posts created at (or, with clock skew, after) the query instant.
    pub min_age_minutes: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            min_age_minutes: 1.0,
        }
    }
}

/// Post age in minutes at `now`, never below `floor`.
pub fn age_minutes(created_at: DateTime<Utc>, now: DateTime<Utc>, floor: f64) -> f64 {
    let elapsed = (now - created_at).num_milliseconds() as f64 / 60_000.0;
    elapsed.max(floor)
}

/// `(w_l·likes + w_c·comments + w_b·bookmarks) / age_minutes²`
pub fn activity_score(
    metrics: &PostMetrics,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    params: &ScoreParams,
) -> f64 {
    let w = &params.weights;
    let engagement = w.like * metrics.like_count as f64
        + w.comment * metrics.comment_count as f64
        + w.bookmark * metrics.bookmark_count as f64;
    let age = age_minutes(created_at, now, params.min_age_minutes);
    engagement / age.powi(2)
}

/// Picks the `n` communities with the most members. Equal member counts are
/// ordered by community id, ascending.
pub fn top_communities<I>(member_counts: I, n: u32) -> Vec<Uuid>
where
    I: IntoIterator<Item = (Uuid, u64)>,
{
    let mut ranked: Vec<(Uuid, u64)> = member_counts
        .into_iter()
        .filter(|(_, members)| *members > 0)
        .collect();
    ranked.sort_by(|(a_id, a_members), (b_id, b_members)| {
        b_members.cmp(a_members).then_with(|| a_id.cmp(b_id))
    });
    ranked
        .into_iter()
        .take(n as usize)
        .map(|(id, _)| id)
        .collect()
}

/// Everything a store needs to produce one feed slice.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    pub scope: FeedScope,
    pub sort: SortMode,
    pub page: PageRequest,
    /// The single "now" every score of this request is computed against.
    pub now: DateTime<Utc>,
    pub score: ScoreParams,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use chrono::Duration;

    fn ranked(id: Uuid, created_at: DateTime<Utc>, likes: i64, score: f64) -> RankedPost {
        RankedPost {
            post: Post {
                id,
                title: "t".into(),
                content: "c".into(),
                owner_id: Uuid::nil(),
                community_id: Uuid::nil(),
                created_at,
                updated_at: None,
            },
            metrics: PostMetrics {
                like_count: likes,
                ..Default::default()
            },
            activity_score: score,
        }
    }

    #[test]
    fn sort_tokens_parse_and_reject_unknown() {
        assert_eq!("new".parse::<SortMode>().unwrap(), SortMode::Newest);
        assert_eq!("top".parse::<SortMode>().unwrap(), SortMode::Top);
        assert_eq!("hot".parse::<SortMode>().unwrap(), SortMode::Relevance);
        assert_eq!(SortMode::default(), SortMode::Relevance);

        for bad in ["", "HOT", "newest", "relevance", " top"] {
            assert!(
                matches!(bad.parse::<SortMode>(), Err(FeedError::InvalidParameter(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn page_request_rejects_non_positive_values() {
        assert!(matches!(
            PageRequest::new(0, 10, 100),
            Err(FeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            PageRequest::new(1, 0, 100),
            Err(FeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            PageRequest::new(-3, 10, 100),
            Err(FeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            PageRequest::new(1, 101, 100),
            Err(FeedError::InvalidParameter(_))
        ));
        assert!(matches!(
            PageRequest::new(i64::from(u32::MAX) + 1, 10, 100),
            Err(FeedError::InvalidParameter(_))
        ));
    }

    #[test]
    fn page_math() {
        let page = PageRequest::new(3, 10, 100).unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.total_pages(0), 0);
        assert_eq!(page.total_pages(20), 2);
        assert_eq!(page.total_pages(21), 3);
        assert_eq!(page.expected_len(25), 5);
        assert_eq!(page.expected_len(30), 10);
        assert_eq!(page.expected_len(40), 10);
        assert_eq!(page.expected_len(15), 0);

        let max = PageRequest::new(i64::from(u32::MAX), 100, 100).unwrap();
        assert_eq!(max.offset(), u64::from(u32::MAX - 1) * 100);
    }

    #[test]
    fn search_term_trims_and_escapes() {
        assert!(SearchTerm::new("   ").is_none());
        let term = SearchTerm::new("  50%_off\\ ").unwrap();
        assert_eq!(term.as_str(), "50%_off\\");
        assert_eq!(term.like_pattern(), "%50\\%\\_off\\\\%");

        let rust = SearchTerm::new("RuSt").unwrap();
        assert!(rust.matches("Learning rust in 2024"));
        assert!(!rust.matches("Go tips"));
    }

    #[test]
    fn score_decays_with_age_squared() {
        let now = Utc::now();
        let metrics = PostMetrics {
            like_count: 5,
            comment_count: 1,
            bookmark_count: 0,
        };
        let params = ScoreParams::default();

        let fresh = activity_score(&metrics, now - Duration::minutes(10), now, &params);
        let stale = activity_score(&metrics, now - Duration::minutes(120), now, &params);

        assert!((fresh - 2.0 / 100.0).abs() < 1e-9);
        assert!((stale - 2.0 / 14_400.0).abs() < 1e-12);
        assert!(fresh > stale);
    }

    #[test]
    fn score_is_finite_for_brand_new_and_future_posts() {
        let now = Utc::now();
        let metrics = PostMetrics {
            like_count: 1,
            comment_count: 1,
            bookmark_count: 1,
        };
        let params = ScoreParams::default();

        let same_instant = activity_score(&metrics, now, now, &params);
        let skewed = activity_score(&metrics, now + Duration::seconds(30), now, &params);

        assert!(same_instant.is_finite());
        assert!((same_instant - 1.0).abs() < 1e-9);
        assert_eq!(same_instant, skewed);
    }

    #[test]
    fn zero_engagement_scores_zero() {
        let now = Utc::now();
        let score = activity_score(
            &PostMetrics::default(),
            now - Duration::minutes(5),
            now,
            &ScoreParams::default(),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn compare_breaks_ties_by_id_descending() {
        let now = Utc::now();
        let older_id = Uuid::from_u128(1);
        let newer_id = Uuid::from_u128(2);
        let a = ranked(older_id, now, 4, 1.0);
        let b = ranked(newer_id, now, 4, 1.0);

        for mode in [SortMode::Newest, SortMode::Top, SortMode::Relevance] {
            assert_eq!(mode.compare(&a, &b), Ordering::Greater, "{mode}");
            assert_eq!(mode.compare(&b, &a), Ordering::Less, "{mode}");
        }
    }

    #[test]
    fn compare_orders_by_sort_key() {
        let now = Utc::now();
        let early = ranked(Uuid::from_u128(1), now - Duration::minutes(30), 9, 0.1);
        let late = ranked(Uuid::from_u128(2), now, 1, 0.9);

        assert_eq!(SortMode::Newest.compare(&late, &early), Ordering::Less);
        assert_eq!(SortMode::Top.compare(&early, &late), Ordering::Less);
        assert_eq!(SortMode::Relevance.compare(&late, &early), Ordering::Less);
    }

    #[test]
    fn top_communities_breaks_ties_by_id() {
        let a = Uuid::from_u128(10);
        let b = Uuid::from_u128(20);
        let c = Uuid::from_u128(30);
        let d = Uuid::from_u128(40);

        let top = top_communities([(d, 2), (c, 5), (b, 2), (a, 1)], 3);
        assert_eq!(top, vec![c, b, d]);

        assert!(top_communities([(a, 0)], 3).is_empty());
        assert!(top_communities([(a, 1)], 0).is_empty());
    }
}
