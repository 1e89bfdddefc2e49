use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Gate called before every outbound feed request.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn wait(&self);
}

/// Spaces request starts at least `interval` apart across every caller that
/// shares it. The first request goes out immediately.
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Pacer for RateLimiter {
    async fn wait(&self) {
        // Held across the sleep so concurrent workers queue behind each other.
        let mut last_request = self.last_request.lock().await;

        if let Some(last) = *last_request {
            let next = last + self.interval;
            if Instant::now() < next {
                debug!("Pacing: waiting {:?}", next - Instant::now());
                tokio::time::sleep_until(next).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

/// No pacing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unpaced;

#[async_trait]
impl Pacer for Unpaced {
    async fn wait(&self) {}
}
