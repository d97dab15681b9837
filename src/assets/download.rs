//! Authenticated binary downloads with manual redirects
//!
//! Redirects are followed by hand so the credential can be re-attached on
//! each hop. It is only attached when the hop stays on the original origin or
//! goes to an explicitly trusted host.

use super::AssetError;
use crate::config::{Config, DEFAULT_MAX_ATTACHMENT_BYTES};
use crate::source::Credentials;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// A fetched attachment body
#[derive(Debug, Clone)]
pub struct DownloadedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub final_url: String,
}

/// Downloads attachment binaries
#[derive(Debug, Clone)]
pub struct AssetDownloader {
    client: Client,
    credentials: Credentials,
    max_redirects: u32,
    max_bytes: u64,
    trusted_hosts: Vec<String>,
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn parse_http_url(raw: &str) -> Result<Url, AssetError> {
    let url = Url::parse(raw).map_err(|e| AssetError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(AssetError::InvalidScheme(raw.to_string())),
    }
}

impl AssetDownloader {
    pub fn new(config: &Config) -> Result<Self, AssetError> {
        let client = Client::builder()
            .user_agent(concat!("wiki-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.source.request_timeout))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| AssetError::Network {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self::with_client(
            client,
            Credentials::from_config(&config.source),
            config.sync.max_redirects,
            config.sync.trusted_redirect_hosts.clone(),
        )
        .with_max_bytes(config.sync.max_attachment_bytes))
    }

    /// `client` must not follow redirects on its own
    pub fn with_client(
        client: Client,
        credentials: Credentials,
        max_redirects: u32,
        trusted_hosts: Vec<String>,
    ) -> Self {
        Self {
            client,
            credentials,
            max_redirects,
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            trusted_hosts: trusted_hosts
                .into_iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Caps the size of a downloaded body
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn may_receive_credentials(&self, origin: &url::Origin, url: &Url) -> bool {
        if &url.origin() == origin {
            return true;
        }
        url.host_str()
            .map(|h| self.trusted_hosts.iter().any(|t| t == &h.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Fetches `url`, following at most `max_redirects` redirects
    pub async fn download(&self, url: &str) -> Result<DownloadedAsset, AssetError> {
        let mut current = parse_http_url(url)?;
        let origin = current.origin();
        let mut hops = 0;

        loop {
            let mut request = self.client.get(current.clone());
            if self.may_receive_credentials(&origin, &current) {
                request = self.credentials.apply(request);
            } else {
                debug!("Not forwarding credentials to {}", current);
            }

            let response = request.send().await.map_err(|e| AssetError::Network {
                url: current.to_string(),
                message: e.to_string(),
            })?;
            let status = response.status();

            if is_followed_redirect(status) {
                if hops >= self.max_redirects {
                    return Err(AssetError::TooManyRedirects {
                        limit: self.max_redirects,
                        url: url.to_string(),
                    });
                }

                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| AssetError::MissingLocation(current.to_string()))?;
                let next = current
                    .join(location)
                    .map_err(|_| AssetError::MissingLocation(current.to_string()))?;
                if !matches!(next.scheme(), "http" | "https") {
                    warn!("Refusing redirect from {} to {}", current, next);
                    return Err(AssetError::InvalidScheme(next.to_string()));
                }

                debug!("Redirect {} -> {} ({})", current, next, status);
                current = next;
                hops += 1;
                continue;
            }

            if !status.is_success() {
                return Err(AssetError::Http {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let bytes = self.read_body(response, &current).await?;

            return Ok(DownloadedAsset {
                bytes,
                content_type,
                final_url: current.to_string(),
            });
        }
    }

    /// Reads a response body chunk by chunk, failing once it exceeds `max_bytes`
    async fn read_body(
        &self,
        mut response: reqwest::Response,
        url: &Url,
    ) -> Result<Vec<u8>, AssetError> {
        let too_large = || AssetError::TooLarge {
            limit: self.max_bytes,
            url: url.to_string(),
        };
        if response.content_length().map_or(false, |len| len > self.max_bytes) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| AssetError::Network {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
