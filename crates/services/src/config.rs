use std::time::Duration;

use domains::ScoreParams;

/// Engine parameters. Built once at startup and shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// How many communities (by member count) bound the user and global feeds.
    pub top_communities: u32,
    /// Page size used when the caller does not ask for one.
    pub default_limit: u32,
    pub max_limit: u32,
    /// Upper bound for one feed request, store round-trips included.
    pub query_timeout: Duration,
    pub score: ScoreParams,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            top_communities: 3,
            default_limit: 10,
            max_limit: 100,
            query_timeout: Duration::from_secs(5),
            score: ScoreParams::default(),
        }
    }
}
