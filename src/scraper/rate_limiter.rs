//! Rate limiting for outbound portal requests.
//!
//! The ancestor of this module is a lock-free multi-domain token bucket
//! built for concurrent multi-page crawling (`DashMap` of per-domain
//! buckets, `AtomicU128` packed state). That machinery earns its keep when
//! many pages across many domains are in flight at once; the job executor
//! here runs a single portal, single parcel, at a time, so calls are
//! already serial and there is nothing to contend over. What survives is
//! the same idea at the granularity it
//! actually needs: two named request classes, each with a jittered
//! `[lo, hi]` delay, plus a periodic longer "thinking pause" to further
//! disguise throughput.

use crate::config::{DelayRange, PipelineConfig};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Page,
    Document,
}

pub struct RateLimiter {
    page_delay: DelayRange,
    document_delay: DelayRange,
    thinking_pause_every: u32,
    thinking_pause_delay: DelayRange,
    consecutive: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            page_delay: config.page_delay(),
            document_delay: config.document_delay(),
            thinking_pause_every: config.thinking_pause_every(),
            thinking_pause_delay: config.thinking_pause_delay(),
            consecutive: 0,
        }
    }

    /// Block for a jittered delay appropriate to the given request class.
    pub async fn wait(&self, class: RequestClass) {
        let range = match class {
            RequestClass::Page => self.page_delay,
            RequestClass::Document => self.document_delay,
        };
        tokio::time::sleep(jittered(range)).await;
    }

    /// Call once per completed parcel. Every `thinking_pause_every`
    /// parcels, additionally blocks for a longer "thinking pause" to
    /// disguise throughput further.
    pub async fn after_parcel(&mut self) {
        self.consecutive += 1;
        if self.thinking_pause_every > 0 && self.consecutive % self.thinking_pause_every == 0 {
            tokio::time::sleep(jittered(self.thinking_pause_delay)).await;
        }
    }
}

fn jittered(range: DelayRange) -> Duration {
    if range.hi <= range.lo {
        return range.lo;
    }
    let lo_nanos = range.lo.as_nanos() as u64;
    let hi_nanos = range.hi.as_nanos() as u64;
    let nanos = rand::rng().random_range(lo_nanos..=hi_nanos);
    Duration::from_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_delay_stays_in_range() {
        let range = DelayRange::new(Duration::from_millis(10), Duration::from_millis(20));
        for _ in 0..100 {
            let d = jittered(range);
            assert!(d >= Duration::from_millis(10));
            assert!(d <= Duration::from_millis(20));
        }
    }

    #[test]
    fn degenerate_range_returns_lo() {
        let range = DelayRange::new(Duration::from_millis(5), Duration::from_millis(5));
        assert_eq!(jittered(range), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn thinking_pause_fires_every_n_parcels() {
        let config = PipelineConfig::new().with_thinking_pause(3, Duration::from_millis(1)..Duration::from_millis(2));
        let mut limiter = RateLimiter::new(&config);
        for _ in 0..3 {
            limiter.after_parcel().await;
        }
        assert_eq!(limiter.consecutive, 3);
    }
}
