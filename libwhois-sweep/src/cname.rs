use std::{future::Future, sync::Arc};

use hickory_resolver::{
    config::ResolverOpts,
    proto::rr::{RData, RecordType},
    ResolveError, TokioResolver,
};
use thiserror::Error;

use crate::types::SweepConfig;

#[derive(Debug, Error)]
pub enum NoRecordError {
    #[error("DNS lookup for {name} failed: {message}")]
    Lookup { name: String, message: String },
    #[error("no CNAME records for {0}")]
    Empty(String),
}

/// A single CNAME lookup for a TLD's `whois-servers.net` alias.
pub trait CnameSource: Send + Sync {
    fn lookup(&self, tld: &str) -> impl Future<Output = Result<Vec<String>, NoRecordError>> + Send;
}

impl<T: CnameSource> CnameSource for &T {
    fn lookup(&self, tld: &str) -> impl Future<Output = Result<Vec<String>, NoRecordError>> + Send {
        (**self).lookup(tld)
    }
}

impl<T: CnameSource> CnameSource for Arc<T> {
    fn lookup(&self, tld: &str) -> impl Future<Output = Result<Vec<String>, NoRecordError>> + Send {
        (**self).lookup(tld)
    }
}

pub fn alias_name(tld: &str, suffix: &str) -> String {
    format!("{}.{}", tld.to_lowercase(), suffix)
}

pub struct DnsCnameProbe {
    resolver: TokioResolver,
    suffix: String,
}

impl DnsCnameProbe {
    /// Builds a probe on top of the host's resolver configuration.
    pub fn from_config(config: &SweepConfig) -> Result<Self, ResolveError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = config.dns_timeout;
        opts.attempts = 1;
        opts.ndots = 0;

        let resolver = TokioResolver::builder_tokio()?
            .with_options(opts)
            .build();

        Ok(Self {
            resolver,
            suffix: config.cname_suffix.clone(),
        })
    }
}

impl CnameSource for DnsCnameProbe {
    async fn lookup(&self, tld: &str) -> Result<Vec<String>, NoRecordError> {
        let name = alias_name(tld, &self.suffix);
        let lookup = self
            .resolver
            .lookup(name.as_str(), RecordType::CNAME)
            .await
            .map_err(|e| NoRecordError::Lookup {
                name: name.clone(),
                message: e.to_string(),
            })?;

        cname_targets(&name, lookup.iter())
    }
}

/// Targets of the CNAME records in `records`, without the trailing root dot.
///
/// Other record types are skipped. An answer with no usable target is
/// `NoRecordError::Empty`.
fn cname_targets<'a>(
    name: &str,
    records: impl IntoIterator<Item = &'a RData>,
) -> Result<Vec<String>, NoRecordError> {
    let targets: Vec<String> = records
        .into_iter()
        .filter_map(|rdata| match rdata {
            RData::CNAME(cname) => Some(cname.0.to_utf8()),
            _ => None,
        })
        .map(|target| target.trim_end_matches('.').to_string())
        .filter(|target| !target.is_empty())
        .collect();

    if targets.is_empty() {
        return Err(NoRecordError::Empty(name.to_string()));
    }
    Ok(targets)
}
