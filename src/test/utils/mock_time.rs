use crate::time::TimeProvider;
use async_trait::async_trait;
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

/// Simulated clock for tests. `sleep` yields briefly so spawned workers
/// make progress without wall-clock waits; tests move the clock with
/// `advance_time` and `set`.
#[derive(Debug)]
pub struct MockTimeProvider {
    current_time: Arc<AtomicI64>,
}

impl MockTimeProvider {
    pub fn new(start_time: i64) -> Self {
        Self { current_time: Arc::new(AtomicI64::new(start_time)) }
    }

    pub async fn advance_time(&self, seconds: i64) {
        self.sleep(Duration::from_micros(100)).await;
        self.current_time.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set(&self, time: i64) {
        self.current_time.store(time, Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeProvider for MockTimeProvider {
    fn now(&self) -> i64 {
        self.current_time.load(Ordering::SeqCst)
    }

    async fn sleep(&self, _duration: Duration) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
