//! # services
//!
//! The feed ranking engine. Validates requests, resolves scopes, bounds each
//! request by a deadline and assembles pages from the content store ports.

mod assembler;
pub mod config;
pub mod feed_service;

pub use config::FeedConfig;
pub use feed_service::{FeedParams, FeedService};
