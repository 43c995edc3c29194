//! Route table and shared state.

use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use domains::TokenVerifier;
use prometheus_client::registry::Registry;
use services::FeedService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::metrics::FeedMetrics;

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub feeds: FeedService,
    pub tokens: Arc<dyn TokenVerifier>,
    pub cookie_name: Arc<str>,
    pub metrics: FeedMetrics,
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(feeds: FeedService, tokens: Arc<dyn TokenVerifier>, cookie_name: &str) -> Self {
        let mut registry = Registry::default();
        let metrics = FeedMetrics::register(&mut registry);
        Self {
            feeds,
            tokens,
            cookie_name: Arc::from(cookie_name),
            metrics,
            registry: Arc::new(registry),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/communities/{community_id}/posts", get(handlers::community_posts))
        .route("/api/posts/feed", get(handlers::user_feed))
        .route("/api/posts/explore", get(handlers::explore))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
