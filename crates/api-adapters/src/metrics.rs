//! Prometheus series for the feed endpoints.

use std::time::Duration;

use domains::FeedError;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Ok,
    Invalid,
    NotFound,
    Unauthorized,
    Timeout,
    Error,
}

impl Outcome {
    pub fn of<T>(result: &Result<T, FeedError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(FeedError::InvalidParameter(_)) => Self::Invalid,
            Err(FeedError::NotFound(..)) => Self::NotFound,
            Err(FeedError::Unauthorized(_)) => Self::Unauthorized,
            Err(FeedError::DeadlineExceeded(_)) => Self::Timeout,
            Err(FeedError::Internal(_)) => Self::Error,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub feed: String,
    pub sort: String,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FeedLabels {
    pub feed: String,
}

type DurationFamily = Family<FeedLabels, Histogram, fn() -> Histogram>;

fn duration_histogram() -> Histogram {
    // 5ms .. ~10s
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

#[derive(Clone)]
pub struct FeedMetrics {
    requests: Family<RequestLabels, Counter>,
    duration: DurationFamily,
}

impl FeedMetrics {
    /// Creates the series and registers them under `registry`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self {
            requests: Family::default(),
            duration: Family::new_with_constructor(duration_histogram),
        };
        registry.register(
            "feed_requests",
            "Feed requests by feed, sort mode and outcome",
            metrics.requests.clone(),
        );
        registry.register(
            "feed_request_duration_seconds",
            "Time spent serving a feed request",
            metrics.duration.clone(),
        );
        metrics
    }

    pub fn observe(&self, feed: &str, sort: &str, outcome: Outcome, elapsed: Duration) {
        self.requests
            .get_or_create(&RequestLabels {
                feed: feed.to_string(),
                sort: sort.to_string(),
                outcome,
            })
            .inc();
        self.duration
            .get_or_create(&FeedLabels {
                feed: feed.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn outcome_follows_error_category() {
        let ok: Result<(), FeedError> = Ok(());
        assert_eq!(Outcome::of(&ok), Outcome::Ok);

        let cases = [
            (FeedError::invalid("page"), Outcome::Invalid),
            (FeedError::NotFound("user", "x".into()), Outcome::NotFound),
            (FeedError::Unauthorized("no token".into()), Outcome::Unauthorized),
            (FeedError::DeadlineExceeded(Duration::from_secs(1)), Outcome::Timeout),
            (FeedError::Internal("db".into()), Outcome::Error),
        ];
        for (err, expected) in cases {
            assert_eq!(Outcome::of::<()>(&Err(err)), expected);
        }
    }

    #[test]
    fn observed_requests_are_exported() {
        let mut registry = Registry::default();
        let metrics = FeedMetrics::register(&mut registry);
        metrics.observe("global", "hot", Outcome::Ok, Duration::from_millis(12));
        metrics.observe("global", "hot", Outcome::Ok, Duration::from_millis(30));

        let mut text = String::new();
        encode(&mut text, &registry).unwrap();
        assert!(text.contains(r#"feed_requests_total{feed="global",sort="hot",outcome="Ok"} 2"#));
        assert!(text.contains(r#"feed_request_duration_seconds_count{feed="global"} 2"#));
    }
}
