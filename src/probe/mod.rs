//! Category probing
//!
//! A probe answers three questions about one category page for one store:
//! how many items it lists, whether it is a paginated listing, and which
//! child categories it links to. Access denial is reported as a distinct
//! `Blocked` error so callers can back off instead of reading it as an
//! empty hub.

mod http;
mod parser;

pub use http::{build_http_client, HttpCategoryProbe, PageFetcher};
pub use parser::{parse_category_page, parse_listing_page, ListingItem, PageSelectors, ParsedCategory, ParsedListing};

use async_trait::async_trait;
use thiserror::Error;

/// Errors a probe (or listing fetch) can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Access blocked at {url}")]
    Blocked { url: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },
}

impl ProbeError {
    /// Returns true for failures worth retrying after a backoff
    ///
    /// Blocks, timeouts and server-side (5xx) errors are transient;
    /// malformed pages and client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Blocked { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Malformed { .. } => false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Store scoping for a probe call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContext {
    pub store_id: Option<String>,
}

impl StoreContext {
    pub fn new(store_id: Option<String>) -> Self {
        Self { store_id }
    }
}

/// What a probe observed on a category page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Items the category reports
    pub count: u64,

    /// Whether the page is a paginated product listing
    pub is_listing: bool,

    /// Absolute URLs of child categories
    pub child_urls: Vec<String>,
}

/// Source of category page observations
#[async_trait]
pub trait CategoryProbe: Send + Sync {
    async fn probe(&self, url: &str, store: &StoreContext) -> Result<ProbeResponse, ProbeError>;
}
