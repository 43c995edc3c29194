//! # FeedService
//!
//! Entry points for the three feeds. Every call follows the same path:
//! validate → resolve scope → fetch page and count from one snapshot →
//! attach owners and images. Nothing is written and no state survives the call.

use std::future::Future;
use std::sync::Arc;

use domains::{
    Clock, FeedError, FeedPage, FeedQuery, FeedRepository, FeedScope, PageRequest, Result,
    SearchTerm, SortMode, UserDirectory,
};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::assembler;
use crate::config::FeedConfig;

/// Caller-supplied paging and ordering.
#[derive(Debug, Clone, Copy)]
pub struct FeedParams {
    pub page: i64,
    /// `None` uses the configured default page size.
    pub limit: Option<i64>,
    pub sort: SortMode,
    /// Optional caller deadline. The configured timeout still applies.
    pub deadline: Option<Instant>,
}

impl Default for FeedParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: None,
            sort: SortMode::default(),
            deadline: None,
        }
    }
}

/// The feed ranking engine.
#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedRepository>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(
        repo: Arc<dyn FeedRepository>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        config: FeedConfig,
    ) -> Self {
        Self {
            repo,
            users,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Posts of one community, optionally filtered by a title search.
    #[instrument(skip(self, params), fields(feed = "community", sort = %params.sort, page = params.page))]
    pub async fn community_feed(
        &self,
        community_id: Uuid,
        search: Option<&str>,
        params: FeedParams,
    ) -> Result<FeedPage> {
        let page = self.page_request(&params)?;
        let scope = FeedScope::Community {
            community_id,
            search: search.and_then(SearchTerm::new),
        };

        self.within_deadline(params.deadline, async {
            let exists = self
                .repo
                .community_exists(community_id)
                .await
                .map_err(|err| data_access("checking community", err))?;
            if !exists {
                return Err(FeedError::NotFound("community", community_id.to_string()));
            }
            self.rank(scope, params.sort, page).await
        })
        .await
    }

    /// Posts of the largest communities the user has joined.
    #[instrument(skip(self, params), fields(feed = "user", sort = %params.sort, page = params.page))]
    pub async fn user_feed(&self, user_id: Uuid, params: FeedParams) -> Result<FeedPage> {
        let page = self.page_request(&params)?;
        let scope = FeedScope::Member {
            user_id,
            top_n: self.config.top_communities,
        };

        self.within_deadline(params.deadline, async {
            let exists = self
                .users
                .user_exists(user_id)
                .await
                .map_err(|err| data_access("checking user", err))?;
            if !exists {
                return Err(FeedError::NotFound("user", user_id.to_string()));
            }
            self.rank(scope, params.sort, page).await
        })
        .await
    }

    /// Posts of the largest communities on the platform.
    #[instrument(skip(self, params), fields(feed = "global", sort = %params.sort, page = params.page))]
    pub async fn global_feed(&self, params: FeedParams) -> Result<FeedPage> {
        let page = self.page_request(&params)?;
        let scope = FeedScope::Global {
            top_n: self.config.top_communities,
        };

        self.within_deadline(params.deadline, self.rank(scope, params.sort, page))
            .await
    }

    fn page_request(&self, params: &FeedParams) -> Result<PageRequest> {
        let limit = params
            .limit
            .unwrap_or_else(|| i64::from(self.config.default_limit));
        PageRequest::new(params.page, limit, self.config.max_limit)
    }

    async fn rank(&self, scope: FeedScope, sort: SortMode, page: PageRequest) -> Result<FeedPage> {
        let query = FeedQuery {
            scope,
            sort,
            page,
            now: self.clock.now(),
            score: self.config.score,
        };

        let slice = self
            .repo
            .fetch_feed(&query)
            .await
            .map_err(|err| data_access("fetching feed page", err))?;

        // Both numbers come from one snapshot; disagreement is a store bug.
        let expected = page.expected_len(slice.total);
        if slice.rows.len() as u64 != expected {
            error!(
                rows = slice.rows.len(),
                expected,
                total = slice.total,
                "feed page and count disagree"
            );
            return Err(FeedError::Internal(
                "feed page and count disagree".to_string(),
            ));
        }

        let total = slice.total;
        let posts = assembler::assemble(self.repo.as_ref(), self.users.as_ref(), slice.rows).await?;
        debug!(returned = posts.len(), total, "feed page assembled");

        Ok(FeedPage {
            posts,
            total,
            total_pages: page.total_pages(total),
            page: page.page(),
            limit: page.limit(),
        })
    }

    async fn within_deadline<F, T>(&self, deadline: Option<Instant>, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let budget = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.config.query_timeout),
            None => self.config.query_timeout,
        };

        match tokio::time::timeout(budget, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?budget, "feed request abandoned at deadline");
                Err(FeedError::DeadlineExceeded(budget))
            }
        }
    }
}

fn data_access(context: &'static str, err: anyhow::Error) -> FeedError {
    error!(error = ?err, "{context} failed");
    FeedError::data_access(err.context(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use domains::{
        FeedSlice, FixedClock, MockFeedRepository, MockUserDirectory, OwnerSummary, Post,
        PostImage, PostMetrics, RankedPost,
    };
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ranked(id: u128, owner: u128, community: Uuid) -> RankedPost {
        RankedPost {
            post: Post {
                id: Uuid::from_u128(id),
                title: format!("post {id}"),
                content: "body".into(),
                owner_id: Uuid::from_u128(owner),
                community_id: community,
                created_at: now() - ChronoDuration::minutes(id as i64),
                updated_at: None,
            },
            metrics: PostMetrics::default(),
            activity_score: 0.0,
        }
    }

    fn owner(id: u128) -> OwnerSummary {
        OwnerSummary {
            id: Uuid::from_u128(id),
            username: Some(format!("user{id}")),
            user_image: None,
        }
    }

    fn service(repo: MockFeedRepository, users: MockUserDirectory) -> FeedService {
        FeedService::new(
            Arc::new(repo),
            Arc::new(users),
            Arc::new(FixedClock(now())),
            FeedConfig::default(),
        )
    }

    #[tokio::test]
    async fn invalid_paging_is_rejected_before_any_store_call() {
        // Mocks without expectations panic if touched.
        let svc = service(MockFeedRepository::new(), MockUserDirectory::new());

        for params in [
            FeedParams { page: 0, ..Default::default() },
            FeedParams { limit: Some(0), ..Default::default() },
            FeedParams { limit: Some(-5), ..Default::default() },
            FeedParams { limit: Some(101), ..Default::default() },
        ] {
            let err = svc.global_feed(params).await.unwrap_err();
            assert!(matches!(err, FeedError::InvalidParameter(_)), "{params:?}");

            let err = svc
                .community_feed(Uuid::from_u128(1), None, params)
                .await
                .unwrap_err();
            assert!(matches!(err, FeedError::InvalidParameter(_)));

            let err = svc.user_feed(Uuid::from_u128(1), params).await.unwrap_err();
            assert!(matches!(err, FeedError::InvalidParameter(_)));
        }
    }

    #[tokio::test]
    async fn unknown_community_is_not_found() {
        let mut repo = MockFeedRepository::new();
        repo.expect_community_exists().times(1).returning(|_| Ok(false));
        repo.expect_fetch_feed().never();

        let svc = service(repo, MockUserDirectory::new());
        let err = svc
            .community_feed(Uuid::from_u128(9), Some("rust"), FeedParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::NotFound("community", _)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let mut users = MockUserDirectory::new();
        users.expect_user_exists().times(1).returning(|_| Ok(false));

        let svc = service(MockFeedRepository::new(), users);
        let err = svc
            .user_feed(Uuid::from_u128(7), FeedParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::NotFound("user", _)));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_internal() {
        let mut repo = MockFeedRepository::new();
        repo.expect_fetch_feed()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let svc = service(repo, MockUserDirectory::new());
        let err = svc.global_feed(FeedParams::default()).await.unwrap_err();

        match err {
            FeedError::Internal(msg) => assert!(msg.contains("connection reset")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_carries_scope_sort_window_and_clock() {
        let mut repo = MockFeedRepository::new();
        repo.expect_fetch_feed()
            .withf(|q| {
                q.scope == FeedScope::Global { top_n: 3 }
                    && q.sort == SortMode::Top
                    && q.page.page() == 2
                    && q.page.limit() == 5
                    && q.now == now()
            })
            .times(1)
            .returning(|_| Ok(FeedSlice { rows: vec![], total: 5 }));

        let svc = service(repo, MockUserDirectory::new());
        let page = svc
            .global_feed(FeedParams {
                page: 2,
                limit: Some(5),
                sort: SortMode::Top,
                deadline: None,
            })
            .await
            .unwrap();

        assert!(page.posts.is_empty());
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn community_search_is_trimmed_and_blank_means_none() {
        let community = Uuid::from_u128(1);
        let mut repo = MockFeedRepository::new();
        repo.expect_community_exists().returning(|_| Ok(true));
        repo.expect_fetch_feed()
            .withf(move |q| {
                q.scope
                    == FeedScope::Community {
                        community_id: community,
                        search: None,
                    }
            })
            .times(1)
            .returning(|_| Ok(FeedSlice::default()));

        let svc = service(repo, MockUserDirectory::new());
        let page = svc
            .community_feed(community, Some("   "), FeedParams::default())
            .await
            .unwrap();
        assert_eq!(page.total_pages, 0);
    }

    #[tokio::test]
    async fn attachments_are_batched_and_joined_in_page_order() {
        let community = Uuid::from_u128(100);
        let rows = vec![ranked(3, 50, community), ranked(1, 51, community), ranked(2, 50, community)];

        let mut repo = MockFeedRepository::new();
        repo.expect_fetch_feed().times(1).returning(move |_| {
            Ok(FeedSlice {
                rows: rows.clone(),
                total: 3,
            })
        });
        repo.expect_images_for_posts()
            .withf(|ids| {
                ids.iter()
                    .eq(&[Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)])
            })
            .times(1)
            .returning(|_| {
                Ok(vec![
                    PostImage { id: Uuid::from_u128(900), post_id: Uuid::from_u128(1), url: "a.png".into() },
                    PostImage { id: Uuid::from_u128(901), post_id: Uuid::from_u128(1), url: "b.png".into() },
                    PostImage { id: Uuid::from_u128(902), post_id: Uuid::from_u128(2), url: "c.png".into() },
                ])
            });

        let mut users = MockUserDirectory::new();
        users
            .expect_owner_summaries()
            .withf(|ids| ids.iter().eq(&[Uuid::from_u128(50), Uuid::from_u128(51)]))
            .times(1)
            .returning(|_| Ok(vec![owner(51), owner(50)]));

        let svc = service(repo, users);
        let page = svc.global_feed(FeedParams::default()).await.unwrap();

        let ids: Vec<Uuid> = page.posts.iter().map(|p| p.post.id).collect();
        assert_eq!(ids, vec![Uuid::from_u128(3), Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert!(page.posts[0].images.is_empty());
        assert_eq!(page.posts[1].images.len(), 2);
        assert_eq!(page.posts[2].images[0].url, "c.png");
        assert_eq!(page.posts[0].owner.username.as_deref(), Some("user50"));
        assert_eq!(page.posts[1].owner.username.as_deref(), Some("user51"));
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn missing_owner_fails_the_whole_page() {
        let community = Uuid::from_u128(100);
        let mut repo = MockFeedRepository::new();
        repo.expect_fetch_feed().returning(move |_| {
            Ok(FeedSlice {
                rows: vec![ranked(1, 50, community)],
                total: 1,
            })
        });
        repo.expect_images_for_posts().returning(|_| Ok(vec![]));

        let mut users = MockUserDirectory::new();
        users.expect_owner_summaries().returning(|_| Ok(vec![]));

        let svc = service(repo, users);
        let err = svc.global_feed(FeedParams::default()).await.unwrap_err();
        assert!(matches!(err, FeedError::Internal(_)));
    }

    #[tokio::test]
    async fn page_count_mismatch_is_an_error() {
        let community = Uuid::from_u128(100);
        let mut repo = MockFeedRepository::new();
        // Claims 12 matches but returns one row for page 1 of 10.
        repo.expect_fetch_feed().returning(move |_| {
            Ok(FeedSlice {
                rows: vec![ranked(1, 50, community)],
                total: 12,
            })
        });

        let svc = service(repo, MockUserDirectory::new());
        let err = svc.global_feed(FeedParams::default()).await.unwrap_err();
        assert!(matches!(err, FeedError::Internal(_)));
    }

    struct StalledRepo;

    #[async_trait]
    impl FeedRepository for StalledRepo {
        async fn community_exists(&self, _community_id: Uuid) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn fetch_feed(&self, _query: &FeedQuery) -> anyhow::Result<FeedSlice> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(FeedSlice::default())
        }

        async fn images_for_posts(&self, _post_ids: &[Uuid]) -> anyhow::Result<Vec<PostImage>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn slow_store_is_abandoned_at_the_deadline() {
        let svc = FeedService::new(
            Arc::new(StalledRepo),
            Arc::new(MockUserDirectory::new()),
            Arc::new(FixedClock(now())),
            FeedConfig {
                query_timeout: Duration::from_millis(20),
                ..FeedConfig::default()
            },
        );

        let err = svc.global_feed(FeedParams::default()).await.unwrap_err();
        assert!(matches!(err, FeedError::DeadlineExceeded(_)));

        // A caller deadline tighter than the configured timeout wins.
        let svc = FeedService::new(
            Arc::new(StalledRepo),
            Arc::new(MockUserDirectory::new()),
            Arc::new(FixedClock(now())),
            FeedConfig::default(),
        );
        let started = Instant::now();
        let err = svc
            .community_feed(
                Uuid::from_u128(1),
                None,
                FeedParams {
                    deadline: Some(Instant::now() + Duration::from_millis(20)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::DeadlineExceeded(d) if d <= Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
