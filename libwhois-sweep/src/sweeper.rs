use crate::{
    cname::{CnameSource, DnsCnameProbe, NoRecordError},
    ratelimit::QueryPacer,
    retry::RetryingResolver,
    table::WhoisResultTable,
    types::{ResolutionOutcome, SweepConfig, UnresolvedReason},
    whois::{TcpWhoisProbe, WhoisSource},
};
use futures::{
    stream::{self, Stream, StreamExt},
    FutureExt,
};
use hickory_resolver::ResolveError;
use std::{any::Any, panic::AssertUnwindSafe, pin::pin};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to initialise DNS resolver: {0}")]
    Resolver(#[from] ResolveError),
}

/// Resolves WHOIS servers for a batch of TLDs.
///
/// Each TLD goes through the root WHOIS server first (with retries) and
/// falls back to the `<tld>.whois-servers.net` CNAME. At most
/// `concurrency_ceiling` TLDs are in flight at once.
pub struct Sweeper<W = TcpWhoisProbe, D = DnsCnameProbe> {
    whois: RetryingResolver<W>,
    cname: D,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new() -> Result<Self, SweepError> {
        Self::with_config(SweepConfig::default())
    }

    pub fn with_config(config: SweepConfig) -> Result<Self, SweepError> {
        let whois = TcpWhoisProbe::from_config(&config);
        let cname = DnsCnameProbe::from_config(&config)?;
        Ok(Self::from_parts(whois, cname, config))
    }
}

impl<W: WhoisSource, D: CnameSource> Sweeper<W, D> {
    pub fn from_parts(whois: W, cname: D, config: SweepConfig) -> Self {
        let whois = RetryingResolver::new(whois, config.retry_policy())
            .with_pacer(QueryPacer::new(config.max_queries_per_second));
        Self {
            whois,
            cname,
            config,
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Runs the full primary-then-fallback resolution for one TLD.
    ///
    /// Never fails: anything that goes wrong, a panicking probe included,
    /// becomes `Unresolved`.
    pub async fn resolve_one(&self, tld: &str) -> ResolutionOutcome {
        let span = info_span!("tld", tld = %tld);

        AssertUnwindSafe(self.run_task(tld))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                span.in_scope(|| error!(%message, "failed to fetch whois data"));
                ResolutionOutcome::Unresolved {
                    tld: tld.to_string(),
                    reason: UnresolvedReason::Panicked(message),
                }
            })
    }

    async fn run_task(&self, tld: &str) -> ResolutionOutcome {
        if let Some(server) = self.whois.resolve(tld).await {
            return ResolutionOutcome::Resolved {
                tld: tld.to_string(),
                server,
            };
        }

        let reason = match self.cname.lookup(tld).await {
            Ok(targets) => match targets.into_iter().find(|t| !t.is_empty()) {
                Some(server) => {
                    debug!(%server, "resolved through whois-servers.net");
                    return ResolutionOutcome::Resolved {
                        tld: tld.to_string(),
                        server,
                    };
                }
                None => UnresolvedReason::NoCnameRecords,
            },
            Err(NoRecordError::Empty(_)) => UnresolvedReason::NoCnameRecords,
            Err(e) => UnresolvedReason::CnameLookupFailed(e.to_string()),
        };

        match &reason {
            UnresolvedReason::NoCnameRecords => info!("no whois server found"),
            _ => warn!(%reason, "no whois server found"),
        }

        ResolutionOutcome::Unresolved {
            tld: tld.to_string(),
            reason,
        }
    }

    /// Outcomes in completion order, with bounded concurrency.
    pub fn resolve_stream<I>(&self, tlds: I) -> impl Stream<Item = ResolutionOutcome> + '_
    where
        I: IntoIterator<Item = String> + 'static,
    {
        self.indexed_stream(tlds.into_iter().collect())
            .map(|(_, outcome)| outcome)
    }

    fn indexed_stream(
        &self,
        tlds: Vec<String>,
    ) -> impl Stream<Item = (usize, ResolutionOutcome)> + '_ {
        stream::iter(tlds.into_iter().enumerate())
            .map(move |(index, tld)| async move { (index, self.resolve_one(&tld).await) })
            .buffer_unordered(self.config.effective_concurrency())
    }

    /// Resolves every TLD and returns one outcome per input.
    ///
    /// With a batch deadline configured, TLDs still pending when it expires
    /// come back as `Unresolved` with `DeadlineExceeded`.
    pub async fn resolve_all<I>(&self, tlds: I) -> Vec<ResolutionOutcome>
    where
        I: IntoIterator<Item = String>,
    {
        let tlds: Vec<String> = tlds.into_iter().collect();
        info!(
            count = tlds.len(),
            concurrency = self.config.effective_concurrency(),
            "resolving whois servers"
        );

        let Some(limit) = self.config.batch_deadline else {
            return self.resolve_stream(tlds).collect().await;
        };

        let deadline = tokio::time::Instant::now() + limit;
        let mut pending: Vec<Option<String>> = tlds.iter().cloned().map(Some).collect();
        let mut outcomes = Vec::with_capacity(tlds.len());
        let mut stream = pin!(self.indexed_stream(tlds));

        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some((index, outcome))) => {
                    pending[index] = None;
                    outcomes.push(outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    let remaining = pending.iter().flatten().count();
                    warn!(?limit, remaining, "batch deadline exceeded");
                    break;
                }
            }
        }

        outcomes.extend(pending.into_iter().flatten().map(|tld| {
            ResolutionOutcome::Unresolved {
                tld,
                reason: UnresolvedReason::DeadlineExceeded,
            }
        }));
        outcomes
    }

    /// Resolves every TLD and folds the outcomes into the final table.
    pub async fn sweep<I>(&self, tlds: I) -> WhoisResultTable
    where
        I: IntoIterator<Item = String>,
    {
        WhoisResultTable::from_outcomes(self.resolve_all(tlds).await)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whois::ProbeError;
    use std::time::Duration;

    struct StaticWhois(Option<&'static str>);

    impl WhoisSource for StaticWhois {
        async fn query(&self, _tld: &str) -> Result<String, ProbeError> {
            match self.0 {
                Some(reply) => Ok(reply.to_string()),
                None => Err(ProbeError::EmptyResponse),
            }
        }
    }

    struct StaticCname(Result<Vec<&'static str>, ()>);

    impl CnameSource for StaticCname {
        async fn lookup(&self, tld: &str) -> Result<Vec<String>, NoRecordError> {
            match &self.0 {
                Ok(targets) => Ok(targets.iter().map(|t| t.to_string()).collect()),
                Err(()) => Err(NoRecordError::Lookup {
                    name: tld.to_string(),
                    message: "NXDOMAIN".to_string(),
                }),
            }
        }
    }

    struct PanickingCname;

    impl CnameSource for PanickingCname {
        async fn lookup(&self, _tld: &str) -> Result<Vec<String>, NoRecordError> {
            panic!("resolver blew up")
        }
    }

    fn config() -> SweepConfig {
        SweepConfig {
            initial_delay: Duration::from_millis(10),
            ..SweepConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn primary_answer_skips_fallback() {
        let sweeper = Sweeper::from_parts(
            StaticWhois(Some("whois:        whois.nic.io\n")),
            PanickingCname,
            config(),
        );

        assert_eq!(
            sweeper.resolve_one("IO").await,
            ResolutionOutcome::Resolved {
                tld: "IO".to_string(),
                server: "whois.nic.io".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_primary_falls_back_to_cname() {
        let sweeper = Sweeper::from_parts(
            StaticWhois(Some("domain: EXAMPLE\nwhois:\n")),
            StaticCname(Ok(vec!["whois.example"])),
            config(),
        );

        assert_eq!(
            sweeper.resolve_one("EXAMPLE").await,
            ResolutionOutcome::Resolved {
                tld: "EXAMPLE".to_string(),
                server: "whois.example".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_primary_falls_back_to_first_cname() {
        let sweeper = Sweeper::from_parts(
            StaticWhois(None),
            StaticCname(Ok(vec!["first.example", "second.example"])),
            config(),
        );

        let outcome = sweeper.resolve_one("EXAMPLE").await;
        assert_eq!(outcome.server(), Some("first.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn both_strategies_empty_is_unresolved() {
        let sweeper = Sweeper::from_parts(StaticWhois(None), StaticCname(Ok(vec![])), config());

        assert_eq!(
            sweeper.resolve_one("EXAMPLE").await,
            ResolutionOutcome::Unresolved {
                tld: "EXAMPLE".to_string(),
                reason: UnresolvedReason::NoCnameRecords,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dns_error_is_unresolved() {
        let sweeper = Sweeper::from_parts(StaticWhois(None), StaticCname(Err(())), config());

        let outcome = sweeper.resolve_one("EXAMPLE").await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::Unresolved {
                reason: UnresolvedReason::CnameLookupFailed(_),
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_probe_is_contained() {
        let sweeper = Sweeper::from_parts(StaticWhois(None), PanickingCname, config());

        let outcome = sweeper.resolve_one("EXAMPLE").await;
        assert_eq!(
            outcome,
            ResolutionOutcome::Unresolved {
                tld: "EXAMPLE".to_string(),
                reason: UnresolvedReason::Panicked("resolver blew up".to_string()),
            }
        );
    }
}
