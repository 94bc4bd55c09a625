use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY, SHA512};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::package::Package;

pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("registry request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to encode package manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("registry rejected {package}: HTTP {status}: {body}")]
    Rejected {
        package: String,
        status: StatusCode,
        body: String,
    },
}

/// Publishes packages to an npm-compatible registry.
pub struct RegistryPublisher {
    client: Client,
    registry: String,
    token: String,
}

impl RegistryPublisher {
    pub fn new(client: Client, registry: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            registry: registry.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn publish(&self, package: &Package) -> Result<(), PublishError> {
        let name = &package.manifest.name;
        let url = format!("{}/{}", self.registry, name);
        let document = publish_document(package, &self.registry)?;

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&document)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                package: format!("{}@{}", name, package.manifest.version),
                status,
                body,
            });
        }

        info!(version = %package.manifest.version, "published version");
        Ok(())
    }
}

/// The JSON body the registry expects for `npm publish`.
pub fn publish_document(
    package: &Package,
    registry: &str,
) -> Result<Value, serde_json::Error> {
    let manifest = &package.manifest;
    let file_name = package.file_name();
    let tarball_url = format!("{}/{}/-/{}", registry, manifest.name, file_name);

    let shasum = hex(digest(&SHA1_FOR_LEGACY_USE_ONLY, &package.tarball).as_ref());
    let integrity = format!(
        "sha512-{}",
        STANDARD.encode(digest(&SHA512, &package.tarball).as_ref())
    );

    let mut version = serde_json::to_value(manifest)?;
    if let Value::Object(fields) = &mut version {
        fields.insert(
            "_id".to_string(),
            json!(format!("{}@{}", manifest.name, manifest.version)),
        );
        fields.insert(
            "dist".to_string(),
            json!({
                "shasum": shasum,
                "integrity": integrity,
                "tarball": tarball_url,
            }),
        );
    }

    Ok(json!({
        "_id": manifest.name,
        "name": manifest.name,
        "description": manifest.description,
        "dist-tags": { "latest": manifest.version },
        "versions": { manifest.version.clone(): version },
        "access": null,
        "_attachments": {
            file_name: {
                "content_type": "application/octet-stream",
                "data": STANDARD.encode(&package.tarball),
                "length": package.tarball.len(),
            }
        }
    }))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageManifest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn package() -> Package {
        Package {
            manifest: PackageManifest {
                name: "whis-data".to_string(),
                version: "1.2.20261016".to_string(),
                description: "Whois server data for whis".to_string(),
                main: "whois-servers.json".to_string(),
                author: "jolle".to_string(),
                license: "MIT".to_string(),
            },
            tarball: b"abc".to_vec(),
        }
    }

    #[test]
    fn document_carries_version_and_attachment() {
        let doc = publish_document(&package(), NPM_REGISTRY).unwrap();

        assert_eq!(doc["name"], "whis-data");
        assert_eq!(doc["dist-tags"]["latest"], "1.2.20261016");

        let version = &doc["versions"]["1.2.20261016"];
        assert_eq!(version["_id"], "whis-data@1.2.20261016");
        assert_eq!(version["main"], "whois-servers.json");
        assert_eq!(
            version["dist"]["tarball"],
            "https://registry.npmjs.org/whis-data/-/whis-data-1.2.20261016.tgz"
        );
        assert_eq!(
            version["dist"]["shasum"],
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            version["dist"]["integrity"],
            "sha512-3a81oZNherrMQXNJriBBMRLm+k6JqX6iCp7u5ktV05ohkpkqJ0/BqDa6PCOj/uu9RU1EI2Q86A4qmslPpUyknw=="
        );

        let attachment = &doc["_attachments"]["whis-data-1.2.20261016.tgz"];
        assert_eq!(attachment["data"], "YWJj");
        assert_eq!(attachment["length"], 3);
    }

    #[test]
    fn trailing_slash_is_trimmed_from_registry() {
        let publisher = RegistryPublisher::new(Client::new(), "https://registry.example/", "t");
        assert_eq!(publisher.registry, "https://registry.example");
    }

    /// Reads one HTTP request (headers and body) and answers with `reply`.
    async fn serve_once(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let registry = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (registry, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= end + 4 + length
    }

    #[tokio::test]
    async fn rejected_upload_carries_status_and_body() {
        let (registry, server) = serve_once(
            "HTTP/1.1 403 Forbidden\r\nContent-Length: 9\r\nConnection: close\r\n\r\nforbidden",
        )
        .await;
        let publisher = RegistryPublisher::new(Client::new(), registry, "s3cret");

        match publisher.publish(&package()).await {
            Err(PublishError::Rejected {
                package,
                status,
                body,
            }) => {
                assert_eq!(package, "whis-data@1.2.20261016");
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "forbidden");
            }
            other => panic!("expected a rejection, got {:?}", other),
        }

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /whis-data HTTP/1.1\r\n"));
        assert!(request
            .lines()
            .any(|line| line.eq_ignore_ascii_case("authorization: Bearer s3cret")));
    }

    #[tokio::test]
    async fn accepted_upload_sends_publish_document() {
        let (registry, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}",
        )
        .await;
        let publisher = RegistryPublisher::new(Client::new(), registry, "s3cret");

        publisher.publish(&package()).await.unwrap();

        let request = server.await.unwrap();
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let document: Value = serde_json::from_str(body).unwrap();
        assert_eq!(document["dist-tags"]["latest"], "1.2.20261016");
        assert_eq!(
            document["_attachments"]["whis-data-1.2.20261016.tgz"]["data"],
            "YWJj"
        );
    }
}
