use std::{future::Future, io, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use crate::types::SweepConfig;

/// Upper bound on a single WHOIS reply. IANA records are a few KiB.
pub const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: io::Error,
    },
    #[error("WHOIS I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WHOIS query timed out after {0:?}")]
    Timeout(Duration),
    /// The root never answered, which is a transport failure and is retried.
    /// A record that lacks a `whois:` field is a different case: it is an
    /// answer, and it goes straight to the CNAME fallback.
    #[error("WHOIS server closed the connection without a reply")]
    EmptyResponse,
}

/// A single WHOIS lookup for a TLD. One attempt, no retries.
pub trait WhoisSource: Send + Sync {
    fn query(&self, tld: &str) -> impl Future<Output = Result<String, ProbeError>> + Send;
}

impl<T: WhoisSource> WhoisSource for &T {
    fn query(&self, tld: &str) -> impl Future<Output = Result<String, ProbeError>> + Send {
        (**self).query(tld)
    }
}

impl<T: WhoisSource> WhoisSource for Arc<T> {
    fn query(&self, tld: &str) -> impl Future<Output = Result<String, ProbeError>> + Send {
        (**self).query(tld)
    }
}

/// Plain port-43 WHOIS against a fixed root server.
#[derive(Debug, Clone)]
pub struct TcpWhoisProbe {
    server: String,
    port: u16,
    timeout: Duration,
}

impl TcpWhoisProbe {
    pub fn new(server: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(config: &SweepConfig) -> Self {
        Self::new(
            config.whois_server.clone(),
            config.whois_port,
            config.whois_timeout,
        )
    }

    async fn exchange(&self, query: &str) -> Result<Vec<u8>, ProbeError> {
        let mut stream = TcpStream::connect((self.server.as_str(), self.port))
            .await
            .map_err(|source| ProbeError::Connect {
                server: format!("{}:{}", self.server, self.port),
                source,
            })?;
        stream.write_all(format!("{}\r\n", query).as_bytes()).await?;

        let mut response = Vec::new();
        (&mut stream)
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut response)
            .await?;
        Ok(response)
    }
}

impl WhoisSource for TcpWhoisProbe {
    async fn query(&self, tld: &str) -> Result<String, ProbeError> {
        let response = tokio::time::timeout(self.timeout, self.exchange(tld))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        if response.is_empty() {
            return Err(ProbeError::EmptyResponse);
        }
        trace!(bytes = response.len(), server = %self.server, "WHOIS reply received");

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

/// Pulls the `whois:` field out of an IANA TLD record.
///
/// Returns `None` when the field is missing or blank; both mean the root
/// has no referral for this TLD.
pub fn extract_whois_server(response: &str) -> Option<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('%') && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .filter(|(key, _)| key.trim().eq_ignore_ascii_case("whois"))
        .map(|(_, value)| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
