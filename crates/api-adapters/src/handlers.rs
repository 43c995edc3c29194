//! # Feed handlers
//!
//! Query strings arrive as raw strings and are parsed here so that a bad
//! `page`, `limit` or `sortBy` yields the same JSON error body as every other
//! failure, instead of the framework's plain-text rejection.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domains::{FeedError, FeedPage, PostWithMetrics, SortMode};
use prometheus_client::encoding::text::encode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use services::FeedParams;
use tracing::error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::metrics::Outcome;
use crate::router::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQueryParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub search: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FeedQueryParams {
    /// Absent or empty values fall back to page 1, the configured limit and
    /// `hot`.
    pub fn to_params(&self) -> Result<FeedParams, FeedError> {
        let page = match present(&self.page) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| FeedError::invalid("invalid request param page"))?,
            None => 1,
        };
        let limit = present(&self.limit)
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| FeedError::invalid("invalid request param limit"))
            })
            .transpose()?;
        let sort = match present(&self.sort_by) {
            Some(raw) => raw.parse::<SortMode>()?,
            None => SortMode::default(),
        };

        Ok(FeedParams {
            page,
            limit,
            sort,
            deadline: None,
        })
    }

    /// Metric label for the sort mode; unknown tokens collapse to `invalid`.
    fn sort_label(&self) -> &'static str {
        match present(&self.sort_by) {
            Some(raw) => raw.parse::<SortMode>().map_or("invalid", |sort| sort.as_str()),
            None => SortMode::default().as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub success: bool,
    pub posts: Vec<PostWithMetrics>,
    pub no_of_pages: u64,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl From<FeedPage> for FeedResponse {
    fn from(page: FeedPage) -> Self {
        Self {
            success: true,
            posts: page.posts,
            no_of_pages: page.total_pages,
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

type FeedResult = Result<Json<FeedResponse>, ApiError>;

fn record(
    state: &AppState,
    feed: &str,
    query: &FeedQueryParams,
    started: Instant,
    result: &Result<FeedPage, FeedError>,
) {
    state
        .metrics
        .observe(feed, query.sort_label(), Outcome::of(result), started.elapsed());
}

fn respond(result: Result<FeedPage, FeedError>) -> FeedResult {
    Ok(Json(result?.into()))
}

/// `GET /api/communities/{community_id}/posts`
pub async fn community_posts(
    State(state): State<AppState>,
    Path(community_id): Path<String>,
    Query(query): Query<FeedQueryParams>,
) -> FeedResult {
    let started = Instant::now();
    let parsed = Uuid::parse_str(&community_id)
        .map_err(|_| FeedError::invalid("invalid request param communityId"))
        .and_then(|id| Ok((id, query.to_params()?)));
    let result = match parsed {
        Ok((community_id, params)) => {
            state
                .feeds
                .community_feed(community_id, query.search.as_deref(), params)
                .await
        }
        Err(err) => Err(err),
    };

    record(&state, "community", &query, started, &result);
    respond(result)
}

/// `GET /api/posts/feed`, for the authenticated user.
///
/// Auth failures are taken as a value so they are counted like any other
/// outcome before being returned.
pub async fn user_feed(
    State(state): State<AppState>,
    auth: Result<AuthUser, ApiError>,
    Query(query): Query<FeedQueryParams>,
) -> FeedResult {
    let started = Instant::now();
    let result = match (auth, query.to_params()) {
        (Err(ApiError(err)), _) | (Ok(_), Err(err)) => Err(err),
        (Ok(AuthUser(user_id)), Ok(params)) => state.feeds.user_feed(user_id, params).await,
    };

    record(&state, "user", &query, started, &result);
    respond(result)
}

/// `GET /api/posts/explore`
pub async fn explore(
    State(state): State<AppState>,
    Query(query): Query<FeedQueryParams>,
) -> FeedResult {
    let started = Instant::now();
    let result = match query.to_params() {
        Ok(params) => state.feeds.global_feed(params).await,
        Err(err) => Err(err),
    };

    record(&state, "global", &query, started, &result);
    respond(result)
}

/// `GET /api/health`
pub async fn health() -> impl IntoResponse {
    Json(json!({ "success": true, "status": "ok" }))
}

/// `GET /metrics`, OpenMetrics text format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")],
            body,
        ),
        Err(err) => {
            error!(error = %err, "encoding metrics failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                String::new(),
            )
        }
    }
}
