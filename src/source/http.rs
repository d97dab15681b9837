//! REST implementation of `PageSource`

use super::wire::{decode_record, ContentList, WireAttachment, WireContent};
use super::{Credentials, Listing, PageSource, SourceError};
use crate::config::SourceConfig;
use crate::model::{Attachment, Page};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const PAGE_EXPAND: &str = "version,space,body.storage";
const ATTACHMENT_EXPAND: &str = "version,metadata,extensions";
const API_MAX_REDIRECTS: usize = 5;

/// Rejects URLs whose scheme is not http or https
pub fn ensure_http_scheme(url: &Url) -> Result<(), SourceError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(SourceError::InvalidScheme(url.to_string())),
    }
}

/// Builds the client used for REST calls
///
/// Redirects are followed only to http(s) targets; reqwest itself drops the
/// authorization header when a redirect changes host.
pub fn build_api_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let policy = Policy::custom(|attempt| {
        if attempt.previous().len() >= API_MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if matches!(attempt.url().scheme(), "http" | "https") {
            attempt.follow()
        } else {
            attempt.stop()
        }
    });

    Client::builder()
        .user_agent(concat!("wiki-sync/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(policy)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Paginated REST client for a wiki's content API
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    credentials: Credentials,
    page_size: u32,
}

impl HttpPageSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = build_api_client(Duration::from_secs(config.request_timeout))?;
        Ok(Self::with_client(
            client,
            config.base_url(),
            Credentials::from_config(config),
            config.page_size,
        ))
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        credentials: Credentials,
        page_size: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            page_size: page_size.max(1),
        }
    }

    fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, SourceError> {
        let raw = format!("{}/wiki/rest/api/{}", self.base_url, path);
        let mut url = Url::parse(&raw).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        ensure_http_scheme(&url)?;
        Ok(url)
    }

    /// Issues an authenticated GET, `None` on 404
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, SourceError> {
        debug!("GET {}", url);
        let response = self
            .credentials
            .apply(self.client.get(url.clone()))
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Unauthorized {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            }
            _ => {
                return Err(SourceError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            }
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| SourceError::Decode(format!("{}: {}", url, e)))
    }

    /// Walks a paginated listing until a short page is returned
    ///
    /// Records that do not decode are logged and skipped; paging still
    /// advances by the raw record count.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, &str)],
    ) -> Result<Listing<T>, SourceError> {
        let limit = self.page_size.to_string();
        let mut start: u64 = 0;
        let mut listing = Listing::default();

        loop {
            let offset = start.to_string();
            let mut query = filters.to_vec();
            query.push(("limit", limit.as_str()));
            query.push(("start", offset.as_str()));

            let url = self.api_url(path, &query)?;
            let batch: ContentList = self.get_json(url.clone()).await?.ok_or(SourceError::Http {
                status: StatusCode::NOT_FOUND.as_u16(),
                url: url.to_string(),
            })?;

            let received = batch.results.len();
            for record in batch.results {
                match decode_record(record) {
                    Ok(item) => listing.items.push(item),
                    Err(reason) => {
                        warn!("Skipping malformed record from {}: {}", path, reason);
                        listing.skipped.push(reason);
                    }
                }
            }

            if received < self.page_size as usize {
                break;
            }
            start += received as u64;
        }

        Ok(listing)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn list_pages(&self, collection_key: &str) -> Result<Listing<Page>, SourceError> {
        let contents: Listing<WireContent> = self
            .paginate(
                "content",
                &[
                    ("spaceKey", collection_key),
                    ("type", "page"),
                    ("status", "current"),
                    ("expand", PAGE_EXPAND),
                ],
            )
            .await?;

        info!("Listed {} pages in {}", contents.items.len(), collection_key);
        Ok(Listing {
            items: contents
                .items
                .into_iter()
                .map(|c| c.into_page(Some(collection_key)))
                .collect(),
            skipped: contents.skipped,
        })
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<Page>, SourceError> {
        let path = format!("content/{}", urlencoding::encode(page_id));
        let url = self.api_url(&path, &[("expand", PAGE_EXPAND)])?;
        let content: Option<WireContent> = self.get_json(url).await?;
        Ok(content.map(|c| c.into_page(None)))
    }

    async fn list_attachments(
        &self,
        page_id: &str,
    ) -> Result<Listing<Attachment>, SourceError> {
        let path = format!("content/{}/child/attachment", urlencoding::encode(page_id));
        let attachments: Listing<WireAttachment> = self
            .paginate(&path, &[("expand", ATTACHMENT_EXPAND)])
            .await?;

        debug!("Page {} has {} attachments", page_id, attachments.items.len());
        Ok(Listing {
            items: attachments
                .items
                .into_iter()
                .map(|a| a.into_attachment(page_id))
                .collect(),
            skipped: attachments.skipped,
        })
    }
}
