//! HTTP probe implementation
//!
//! This module handles all HTTP requests for discovery and listing scrapes:
//! - Building HTTP clients with the configured user agent and timeout
//! - Scoping requests to a store via a query parameter
//! - Classifying denied access, timeouts and bad responses
//! - Reading category counts and child links from the page

use crate::config::ProbeConfig;
use crate::probe::parser::{parse_category_page, PageSelectors};
use crate::probe::{CategoryProbe, ProbeError, ProbeResponse, StoreContext};
use crate::url::store_scoped_url;
use crate::SweepError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
pub fn build_http_client(config: &ProbeConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches store-scoped pages and classifies failures
///
/// Shared by the category probe and the worker's listing scraper.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    store_param: String,
    blocked_markers: Vec<String>,
}

impl PageFetcher {
    pub fn new(config: &ProbeConfig) -> Result<Self, SweepError> {
        Ok(Self {
            client: build_http_client(config)?,
            store_param: config.store_param.clone(),
            blocked_markers: config.blocked_markers.clone(),
        })
    }

    /// Fetches a page body for a store
    ///
    /// # Error Classification
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | HTTP 403 / 429 | Blocked |
    /// | Blocked marker in body | Blocked |
    /// | Timeout / connection failure | Timeout |
    /// | Other non-2xx | Http |
    /// | Unreadable body | Malformed |
    pub async fn fetch(&self, url: &Url, store: &StoreContext) -> Result<String, ProbeError> {
        let request_url = store_scoped_url(url, &self.store_param, store.store_id.as_deref());
        let url_str = url.to_string();

        let response = match self.client.get(request_url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Err(ProbeError::Timeout { url: url_str });
            }
            Err(e) => {
                return Err(ProbeError::Malformed {
                    url: url_str,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProbeError::Blocked { url: url_str });
        }

        if !status.is_success() {
            return Err(ProbeError::Http {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Err(ProbeError::Timeout { url: url_str }),
            Err(e) => {
                return Err(ProbeError::Malformed {
                    url: url_str,
                    reason: e.to_string(),
                });
            }
        };

        if self
            .blocked_markers
            .iter()
            .any(|marker| !marker.is_empty() && body.contains(marker.as_str()))
        {
            return Err(ProbeError::Blocked { url: url_str });
        }

        Ok(body)
    }
}

/// Category probe backed by plain HTTP fetches and CSS selectors
pub struct HttpCategoryProbe {
    fetcher: PageFetcher,
    selectors: PageSelectors,
}

impl HttpCategoryProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self, SweepError> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            selectors: PageSelectors::from_config(config)?,
        })
    }
}

#[async_trait]
impl CategoryProbe for HttpCategoryProbe {
    async fn probe(&self, url: &str, store: &StoreContext) -> Result<ProbeResponse, ProbeError> {
        let parsed_url = Url::parse(url).map_err(|e| ProbeError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let body = self.fetcher.fetch(&parsed_url, store).await?;
        let parsed = parse_category_page(&body, &parsed_url, &self.selectors);
        let is_listing = parsed.items_on_page > 0;

        // Hubs often omit the count. Tiles stand in for it only on a single
        // page with nothing to drill into.
        let count = match parsed.count {
            Some(count) => count,
            None if is_listing && !parsed.has_next_page && parsed.child_links.is_empty() => {
                parsed.items_on_page as u64
            }
            None if is_listing => {
                return Err(ProbeError::Malformed {
                    url: url.to_string(),
                    reason: "paginated or nested listing without a count".to_string(),
                });
            }
            None if !parsed.child_links.is_empty() => 0,
            None => {
                return Err(ProbeError::Malformed {
                    url: url.to_string(),
                    reason: "no count, items or child links on page".to_string(),
                });
            }
        };

        tracing::trace!(
            "Probed {}: count={}, listing={}, children={}",
            url,
            count,
            is_listing,
            parsed.child_links.len()
        );

        Ok(ProbeResponse {
            count,
            is_listing,
            child_urls: parsed.child_links,
        })
    }
}
