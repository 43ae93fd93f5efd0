//! Async file downloader with redirect handling and URL validation.
//!
//! Redirects are followed by an explicit loop rather than by the HTTP client
//! so that every hop is validated against the allowed hosts and the chain is
//! bounded. The response body is streamed straight to the destination file.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{ProvisionError, Result};

/// Default hosts release downloads may be served from.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &["github.com", "githubusercontent.com"];

/// Default bound on redirect hops.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

// ============================================================================
// Fetch Abstraction
// ============================================================================

/// Fetches a URL into a local file.
///
/// Implemented by [`Downloader`]; tests substitute in-memory fakes.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Downloads `url` to `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64>;
}

// ============================================================================
// Download Policy
// ============================================================================

/// Transport restrictions applied to every request and redirect hop.
#[derive(Debug, Clone)]
pub struct DownloadPolicy {
    /// Hosts (and their subdomains) that may serve downloads.
    pub allowed_hosts: Vec<String>,
    /// Permit `http://` URLs. Only meant for local test servers.
    pub allow_plain_http: bool,
    pub max_redirects: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            allow_plain_http: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl DownloadPolicy {
    /// Checks scheme and host of a URL.
    fn validate(&self, url: &Url) -> Result<()> {
        let invalid = |reason: String| ProvisionError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        match url.scheme() {
            "https" => {}
            "http" if self.allow_plain_http => {}
            other => return Err(invalid(format!("scheme {other} is not allowed, use HTTPS"))),
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("URL must have a host".to_string()))?;

        let is_allowed = self
            .allowed_hosts
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{}", domain)));

        if !is_allowed {
            return Err(invalid(format!(
                "host {} is not in the allowed list {:?}",
                host, self.allowed_hosts
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Downloader
// ============================================================================

/// HTTP downloader backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    policy: DownloadPolicy,
}

impl Downloader {
    /// Builds a downloader with its own HTTP client.
    ///
    /// The client never follows redirects on its own.
    pub fn new(policy: DownloadPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.request_timeout)
            .user_agent(concat!("helmls-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::Http {
                url: String::new(),
                source: e,
            })?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &DownloadPolicy {
        &self.policy
    }

    /// Follows redirects until a final response, bounded by the policy.
    async fn resolve_final(&self, url: &Url) -> Result<reqwest::Response> {
        let mut current = url.clone();
        let mut hops: u32 = 0;

        loop {
            self.policy.validate(&current)?;

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(|e| ProvisionError::Http {
                    url: current.to_string(),
                    source: e,
                })?;

            let status = response.status();
            if !status.is_redirection() {
                if status != StatusCode::OK {
                    return Err(ProvisionError::Download {
                        url: current.to_string(),
                        status: status.as_u16(),
                    });
                }
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ProvisionError::Download {
                    url: current.to_string(),
                    status: status.as_u16(),
                })?;

            if hops >= self.policy.max_redirects {
                return Err(ProvisionError::TooManyRedirects {
                    url: url.to_string(),
                    max: self.policy.max_redirects,
                });
            }
            hops += 1;

            let next = current
                .join(location)
                .map_err(|e| ProvisionError::InvalidUrl {
                    url: location.to_string(),
                    reason: e.to_string(),
                })?;
            debug!(hop = hops, from = %current, to = %next, "Following redirect");
            current = next;
        }
    }
}

#[async_trait]
impl Fetch for Downloader {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProvisionError::io(format!("Failed to create directory: {}", parent.display()), e)
            })?;
        }

        let response = self.resolve_final(url).await?;

        match stream_to_file(response, url, dest).await {
            Ok(bytes) => {
                info!(
                    "Download complete: {} bytes written to {}",
                    bytes,
                    dest.display()
                );
                Ok(bytes)
            }
            Err(e) => {
                // The file handle was dropped inside stream_to_file.
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}

/// Writes the response body to `dest`. The file is closed when this returns.
async fn stream_to_file(response: reqwest::Response, url: &Url, dest: &Path) -> Result<u64> {
    debug!("Content-Length: {:?}", response.content_length());

    let mut file = File::create(dest)
        .await
        .map_err(|e| ProvisionError::io(format!("Failed to create file: {}", dest.display()), e))?;

    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProvisionError::Http {
            url: url.to_string(),
            source: e,
        })?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ProvisionError::io(format!("Failed to write {}", dest.display()), e))?;
        bytes_written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| ProvisionError::io(format!("Failed to flush {}", dest.display()), e))?;

    Ok(bytes_written)
}
