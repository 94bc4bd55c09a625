use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    ratelimit::QueryPacer,
    whois::{extract_whois_server, WhoisSource},
};

/// Exponential backoff: the delay after failed attempt `n` (1-based) is
/// `initial_delay * backoff_factor^(n-1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 1.75,
        }
    }
}

/// WHOIS lookups with retry, reduced to "server or nothing".
pub struct RetryingResolver<W> {
    probe: W,
    policy: RetryPolicy,
    pacer: QueryPacer,
}

impl<W: WhoisSource> RetryingResolver<W> {
    pub fn new(probe: W, policy: RetryPolicy) -> Self {
        Self {
            probe,
            policy,
            pacer: QueryPacer::unlimited(),
        }
    }

    pub fn with_pacer(mut self, pacer: QueryPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the `whois:` server named by the root for `tld`, or `None`
    /// when every attempt failed or the record carries no usable field.
    pub async fn resolve(&self, tld: &str) -> Option<String> {
        let response = self.fetch(tld).await?;
        let server = extract_whois_server(&response);
        debug!(
            whois = server.as_deref().unwrap_or(""),
            "fetched whois entry from IANA"
        );
        server
    }

    /// Raw WHOIS response after up to `max_attempts` tries.
    pub async fn fetch(&self, tld: &str) -> Option<String> {
        let attempts = self.policy.attempts();

        for attempt in 1..=attempts {
            self.pacer.acquire().await;

            match self.probe.query(tld).await {
                Ok(response) => return Some(response),
                Err(e) if attempt < attempts => {
                    let delay = self.policy.delay_after(attempt);
                    debug!(attempt, error = %e, ?delay, "WHOIS attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(attempts, error = %e, "giving up on WHOIS lookup");
                }
            }
        }

        None
    }
}
