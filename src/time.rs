use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

/// Injected wall clock. The engine polls `now` for every scheduling
/// decision and uses `sleep` for tick cadence and retry backoff.
#[async_trait]
pub trait TimeProvider: Send + Sync + Debug {
    /// Current time as a Unix UTC timestamp in seconds.
    fn now(&self) -> i64;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug)]
pub struct RealTimeProvider;

#[async_trait]
impl TimeProvider for RealTimeProvider {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
