use std::{
    num::NonZeroU32,
    path::{Path, PathBuf},
    time::Duration,
};

use libwhois_sweep::{publish::NPM_REGISTRY, PackageSettings, SweepConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub package: PackageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub whois_server: String,
    pub whois_port: u16,
    pub whois_timeout_ms: u64,
    pub dns_timeout_ms: u64,
    pub cname_suffix: String,
    pub concurrency_ceiling: usize,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub batch_deadline_secs: Option<u64>,
    pub max_queries_per_second: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let defaults = SweepConfig::default();
        Self {
            whois_server: defaults.whois_server,
            whois_port: defaults.whois_port,
            whois_timeout_ms: defaults.whois_timeout.as_millis() as u64,
            dns_timeout_ms: defaults.dns_timeout.as_millis() as u64,
            cname_suffix: defaults.cname_suffix,
            concurrency_ceiling: defaults.concurrency_ceiling,
            max_attempts: defaults.max_attempts,
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            backoff_factor: defaults.backoff_factor,
            batch_deadline_secs: None,
            max_queries_per_second: None,
        }
    }
}

impl ResolverConfig {
    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            whois_server: self.whois_server.clone(),
            whois_port: self.whois_port,
            whois_timeout: Duration::from_millis(self.whois_timeout_ms),
            dns_timeout: Duration::from_millis(self.dns_timeout_ms),
            cname_suffix: self.cname_suffix.clone(),
            concurrency_ceiling: self.concurrency_ceiling,
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            batch_deadline: self.batch_deadline_secs.map(Duration::from_secs),
            max_queries_per_second: self.max_queries_per_second.and_then(NonZeroU32::new),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PackageConfig {
    pub name: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub version_prefix: String,
    pub registry: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        let defaults = PackageSettings::default();
        Self {
            name: defaults.name,
            description: defaults.description,
            author: defaults.author,
            license: defaults.license,
            version_prefix: defaults.version_prefix,
            registry: NPM_REGISTRY.to_string(),
        }
    }
}

impl PackageConfig {
    pub fn settings(&self) -> PackageSettings {
        PackageSettings {
            name: self.name.clone(),
            description: self.description.clone(),
            author: self.author.clone(),
            license: self.license.clone(),
            version_prefix: self.version_prefix.clone(),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("whisbot").join("config.toml"))
}

/// Loads the config file. A missing file at the default location means
/// defaults; an explicitly named file must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_config(&content).map_err(|source| ConfigError::Parse { path, source })
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

pub fn get_default_config_toml() -> String {
    r#"# whisbot configuration

[resolver]
# Root WHOIS server queried for every TLD
whois_server = "whois.iana.org"
whois_port = 43
whois_timeout_ms = 10000

# Fallback: CNAME of <tld>.<cname_suffix>
cname_suffix = "whois-servers.net"
dns_timeout_ms = 5000

# At most this many TLDs are resolved at the same time
concurrency_ceiling = 2

# WHOIS retries: delay after attempt n is initial_delay_ms * backoff_factor^(n-1)
max_attempts = 4
initial_delay_ms = 1000
backoff_factor = 1.75

# Give up on outstanding TLDs after this many seconds
# batch_deadline_secs = 1800

# Cap on WHOIS queries per second across all TLDs
# max_queries_per_second = 5

[package]
name = "whis-data"
description = "Whois server data for whis"
author = "jolle"
license = "MIT"
version_prefix = "1.2"
registry = "https://registry.npmjs.org"
"#
    .to_string()
}
