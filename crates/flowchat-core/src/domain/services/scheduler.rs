use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Source of the pacing delays used while a turn streams.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn delay(&self, duration: Duration);
}

/// Real timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn delay(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct ImmediateScheduler {
    requested: Mutex<Vec<Duration>>,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested_delays(&self) -> Vec<Duration> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl Scheduler for ImmediateScheduler {
    async fn delay(&self, duration: Duration) {
        self.requested.lock().push(duration);
    }
}
