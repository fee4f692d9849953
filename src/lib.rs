//! Catalog-Sweep: category coverage discovery and resumable store orchestration
//!
//! This crate discovers a pagination-safe set of category listing pages that
//! together cover a retail catalog, then fans that basis list out across
//! per-store worker processes that checkpoint their progress and survive
//! crashes and restarts.

pub mod category;
pub mod checkpoint;
pub mod config;
pub mod discovery;
pub mod output;
pub mod probe;
pub mod storage;
pub mod supervisor;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for Catalog-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Probe error: {0}")]
    Probe(#[from] probe::ProbeError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] supervisor::SupervisorError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Scrape of {url} failed: {source}")]
    Scrape {
        url: String,
        source: probe::ProbeError,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("No numeric category id in URL: {0}")]
    MissingCategoryId(String),
}

/// Result type alias for Catalog-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use category::{CategoryNode, NodeStatus};
pub use config::Config;
pub use url::{canonicalize_url, extract_category_id, path_segments};
