use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared token bucket in front of the root WHOIS server.
///
/// An unlimited pacer never waits.
pub struct QueryPacer {
    limiter: Option<Limiter>,
}

impl QueryPacer {
    pub fn new(max_per_second: Option<NonZeroU32>) -> Self {
        Self {
            limiter: max_per_second.map(|rate| RateLimiter::direct(Quota::per_second(rate))),
        }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }
}

impl Default for QueryPacer {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_pacer_never_blocks() {
        let pacer = QueryPacer::unlimited();
        assert!(!pacer.is_limited());
        for _ in 0..1000 {
            pacer.acquire().await;
        }
    }

    #[tokio::test]
    async fn limited_pacer_admits_first_burst() {
        let pacer = QueryPacer::new(NonZeroU32::new(5));
        assert!(pacer.is_limited());
        pacer.acquire().await;
    }
}
