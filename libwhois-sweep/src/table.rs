use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::ResolutionOutcome;

/// TLD → WHOIS server, serialized as a flat JSON object.
///
/// Keys are kept sorted so identical sweeps produce identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhoisResultTable {
    servers: BTreeMap<String, String>,
}

impl WhoisResultTable {
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = ResolutionOutcome>,
    {
        let mut servers = BTreeMap::new();
        let mut unresolved = 0usize;

        for outcome in outcomes {
            match outcome {
                ResolutionOutcome::Resolved { tld, server } if !server.is_empty() => {
                    servers.insert(tld, server);
                }
                ResolutionOutcome::Resolved { tld, .. } => {
                    unresolved += 1;
                    debug!(%tld, "dropping empty server");
                }
                ResolutionOutcome::Unresolved { tld, reason } => {
                    unresolved += 1;
                    debug!(%tld, %reason, "dropping unresolved TLD");
                }
            }
        }

        info!(resolved = servers.len(), unresolved, "whois table built");
        Self { servers }
    }

    pub fn get(&self, tld: &str) -> Option<&str> {
        self.servers.get(tld).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.servers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.servers
    }
}
