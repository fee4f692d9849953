//! Configuration module for Catalog-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Pagination limit: {}", config.discovery.pagination_limit);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, DiscoveryConfig, OrchestratorConfig, ProbeConfig, SeedEntry};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
