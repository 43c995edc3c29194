//! # api-adapters
//!
//! HTTP surface of the feed engine. Handlers translate query strings into
//! `FeedParams`, call `FeedService` and map `FeedError` onto status codes.
//! The axum router lives behind the `web-axum` feature; metrics are always
//! available so other transports can record the same series.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod router;

pub use metrics::{FeedMetrics, Outcome};

#[cfg(feature = "web-axum")]
pub use router::{router, AppState};
