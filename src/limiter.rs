use crate::error::{CrawlError, Result};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

pub const MAX_CONCURRENT_FETCHES: usize = 10;
pub const MIN_DISPATCH_SPACING: Duration = Duration::from_millis(200);

/// Bounded-concurrency queue with a minimum gap between dispatches, used to
/// stay under the portal's abuse protection.
pub struct RateLimiter {
    permits: Semaphore,
    min_spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. Zero slots is an error.
    pub fn new(max_concurrent: usize, min_spacing: Duration) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(CrawlError::MissingAsset(
                "rate limiter needs at least one concurrent slot".into(),
            ));
        }
        Ok(Self {
            permits: Semaphore::new(max_concurrent),
            min_spacing,
            next_slot: Mutex::new(None),
        })
    }

    /// Limiter with the portal defaults.
    pub fn for_portal() -> Result<Self> {
        Self::new(MAX_CONCURRENT_FETCHES, MIN_DISPATCH_SPACING)
    }

    /// Wait for a free slot and for this request's dispatch time. The returned
    /// permit must be held until the request completes.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CrawlError::MissingAsset("rate limiter was closed".into()))?;

        let dispatch_at = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_spacing);
            slot
        };
        tokio::time::sleep_until(dispatch_at).await;

        Ok(permit)
    }

    /// Run `job` once a slot is available.
    pub async fn schedule<F, T>(&self, job: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(job.await)
    }
}
