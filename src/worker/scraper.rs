//! Listing scrapes for one category
//!
//! A scrape walks a category listing page by page and returns every product
//! tile it finds. Field extraction beyond link and title is out of scope.

use crate::config::ProbeConfig;
use crate::probe::{parse_listing_page, ListingItem, PageFetcher, PageSelectors, ProbeError, StoreContext};
use crate::SweepError;
use async_trait::async_trait;
use std::collections::HashSet;
use url::Url;

/// Source of listing items for a category
#[async_trait]
pub trait ListingScraper: Send + Sync {
    async fn scrape(&self, category_url: &str, store: &StoreContext) -> Result<Vec<ListingItem>, ProbeError>;
}

/// Listing scraper following `next page` links over HTTP
pub struct HttpListingScraper {
    fetcher: PageFetcher,
    selectors: PageSelectors,
    max_pages: u32,
}

impl HttpListingScraper {
    pub fn new(config: &ProbeConfig) -> Result<Self, SweepError> {
        Ok(Self {
            fetcher: PageFetcher::new(config)?,
            selectors: PageSelectors::from_config(config)?,
            max_pages: config.max_pages.max(1),
        })
    }
}

#[async_trait]
impl ListingScraper for HttpListingScraper {
    async fn scrape(&self, category_url: &str, store: &StoreContext) -> Result<Vec<ListingItem>, ProbeError> {
        let mut page_url = Url::parse(category_url).map_err(|e| ProbeError::Malformed {
            url: category_url.to_string(),
            reason: e.to_string(),
        })?;

        let mut items = Vec::new();
        let mut seen_pages = HashSet::new();

        for page in 1..=self.max_pages {
            seen_pages.insert(page_url.to_string());

            let body = self.fetcher.fetch(&page_url, store).await?;
            let listing = parse_listing_page(&body, &page_url, &self.selectors);
            tracing::debug!(
                "Listing page {} of {}: {} items",
                page,
                category_url,
                listing.items.len()
            );
            items.extend(listing.items);

            let next = listing
                .next_page
                .and_then(|next| Url::parse(&next).ok())
                .filter(|next| !seen_pages.contains(next.as_str()));

            match next {
                Some(next) => page_url = next,
                None => break,
            }

            if page == self.max_pages {
                tracing::warn!(
                    "Stopped {} after {} listing pages; remaining pages skipped",
                    category_url,
                    self.max_pages
                );
            }
        }

        Ok(items)
    }
}
