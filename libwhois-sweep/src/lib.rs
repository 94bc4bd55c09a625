mod cname;
mod http;
pub mod package;
pub mod publish;
mod ratelimit;
mod retry;
mod sweeper;
mod table;
pub mod tlds;
mod types;
mod whois;

pub use cname::{alias_name, CnameSource, DnsCnameProbe, NoRecordError};
pub use http::create_http_client;
pub use package::{Package, PackageError, PackageManifest, PackageSettings};
pub use publish::{PublishError, RegistryPublisher};
pub use ratelimit::QueryPacer;
pub use retry::{RetryPolicy, RetryingResolver};
pub use sweeper::{SweepError, Sweeper};
pub use table::WhoisResultTable;
pub use tlds::{fetch_iana_tlds, TldError};
pub use types::{ResolutionOutcome, SweepConfig, UnresolvedReason};
pub use whois::{extract_whois_server, ProbeError, TcpWhoisProbe, WhoisSource};

/// Resolves the WHOIS server of every given TLD with the default settings.
pub async fn sweep<I>(tlds: I) -> Result<WhoisResultTable, SweepError>
where
    I: IntoIterator<Item = String>,
{
    Ok(Sweeper::new()?.sweep(tlds).await)
}
