use std::io;

use chrono::NaiveDate;
use flate2::{write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::table::WhoisResultTable;

pub const TABLE_FILE: &str = "whois-servers.json";
pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to serialize package contents: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to build archive: {0}")]
    Io(#[from] io::Error),
}

/// Fixed metadata of the published data package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSettings {
    pub name: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub version_prefix: String,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            name: "whis-data".to_string(),
            description: "Whois server data for whis".to_string(),
            author: "jolle".to_string(),
            license: "MIT".to_string(),
            version_prefix: "1.2".to_string(),
        }
    }
}

/// `<prefix>.<YYYYMMDD>`, one release per UTC day.
pub fn package_version(prefix: &str, date: NaiveDate) -> String {
    format!("{}.{}", prefix, date.format("%Y%m%d"))
}

/// The `package.json` shipped next to the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub main: String,
    pub author: String,
    pub license: String,
}

impl PackageManifest {
    pub fn new(settings: &PackageSettings, date: NaiveDate) -> Self {
        Self {
            name: settings.name.clone(),
            version: package_version(&settings.version_prefix, date),
            description: settings.description.clone(),
            main: TABLE_FILE.to_string(),
            author: settings.author.clone(),
            license: settings.license.clone(),
        }
    }
}

/// A gzipped tarball ready to be written out or published.
#[derive(Debug, Clone)]
pub struct Package {
    pub manifest: PackageManifest,
    pub tarball: Vec<u8>,
}

impl Package {
    pub fn build(manifest: PackageManifest, table: &WhoisResultTable) -> Result<Self, PackageError> {
        let manifest_json = serde_json::to_vec(&manifest)?;
        let table_json = serde_json::to_vec(table)?;

        let tarball = build_tarball(&[
            (format!("package/{}", MANIFEST_FILE), manifest_json.as_slice()),
            (format!("package/{}", TABLE_FILE), table_json.as_slice()),
        ])?;
        debug!(bytes = tarball.len(), "npm archive created");

        Ok(Self { manifest, tarball })
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.tgz", self.manifest.name, self.manifest.version)
    }
}

fn build_tarball(entries: &[(String, &[u8])]) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        archive.append_data(&mut header, path, *data)?;
    }

    archive.into_inner()?.finish()
}
