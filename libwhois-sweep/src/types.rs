use std::{fmt, num::NonZeroU32, time::Duration};

use crate::retry::RetryPolicy;

pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";
pub const WHOIS_SERVERS_SUFFIX: &str = "whois-servers.net";

/// Why a TLD ended up without a WHOIS server. Diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    NoCnameRecords,
    CnameLookupFailed(String),
    Panicked(String),
    DeadlineExceeded,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoCnameRecords => f.write_str("no whois server found"),
            UnresolvedReason::CnameLookupFailed(e) => {
                write!(f, "failed to locate whois-servers.net CNAME: {}", e)
            }
            UnresolvedReason::Panicked(msg) => write!(f, "resolution panicked: {}", msg),
            UnresolvedReason::DeadlineExceeded => f.write_str("batch deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved { tld: String, server: String },
    Unresolved { tld: String, reason: UnresolvedReason },
}

impl ResolutionOutcome {
    pub fn tld(&self) -> &str {
        match self {
            ResolutionOutcome::Resolved { tld, .. } | ResolutionOutcome::Unresolved { tld, .. } => {
                tld
            }
        }
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Resolved { server, .. } => Some(server),
            ResolutionOutcome::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved { .. })
    }
}

/// Knobs for a sweep. The defaults reproduce the polite settings used
/// against whois.iana.org: two in flight, four attempts, 1s backoff base.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub whois_server: String,
    pub whois_port: u16,
    pub whois_timeout: Duration,
    pub dns_timeout: Duration,
    pub cname_suffix: String,
    pub concurrency_ceiling: usize,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    /// Stop waiting for outstanding TLDs after this long.
    pub batch_deadline: Option<Duration>,
    /// Upper bound on WHOIS queries per second across all tasks.
    pub max_queries_per_second: Option<NonZeroU32>,
}

impl SweepConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            backoff_factor: self.backoff_factor,
        }
    }

    pub(crate) fn effective_concurrency(&self) -> usize {
        self.concurrency_ceiling.max(1)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            whois_server: IANA_WHOIS_SERVER.to_string(),
            whois_port: 43,
            whois_timeout: Duration::from_secs(10),
            dns_timeout: Duration::from_secs(5),
            cname_suffix: WHOIS_SERVERS_SUFFIX.to_string(),
            concurrency_ceiling: 2,
            max_attempts: 4,
            initial_delay: Duration::from_millis(1000),
            backoff_factor: 1.75,
            batch_deadline: None,
            max_queries_per_second: None,
        }
    }
}
